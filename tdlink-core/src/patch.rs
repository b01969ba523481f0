//! Merging a delivery confirmation into a `sendMessage` response.
//!
//! The engine answers `sendMessage` with the message in its pending state
//! under a temporary id, and later reports the final id through
//! `updateMessageSendSucceeded`. The merge rewrites exactly two spots of the
//! raw response, the first pending-state marker and the first
//! `"id":<temporary>` occurrence, and leaves every other byte untouched.

use tdlink_sdk::Response;

/// Request type the merge applies to.
pub const SEND_MESSAGE_REQUEST: &str = "sendMessage";

/// Discriminator of the pending sending state, as it appears in the raw response.
pub const PENDING_STATE_MARKER: &str = r#""@type":"messageSendingStatePending""#;

/// What the pending marker is replaced with.
pub const SUCCEEDED_STATE_MARKER: &str = r#""@type":"updateMessageSendSucceeded""#;

/// Rewrite a pending `sendMessage` response with the final message id.
pub fn merge_send_succeeded(mut response: Response, old_id: i64, new_id: i64) -> Response {
    let data = response
        .data
        .replacen(PENDING_STATE_MARKER, SUCCEEDED_STATE_MARKER, 1);
    response.data = data.replacen(&format!("\"id\":{old_id}"), &format!("\"id\":{new_id}"), 1);
    response
}
