//! Final exit-status signalling for a session channel.

use russh::server::Handle;
use russh::ChannelId;

/// Sends the `exit-status` request (low byte meaningful, no reply wanted)
/// and closes the channel. Delivery failures are logged and swallowed; the
/// channel is closed exactly once regardless.
pub(crate) async fn report(handle: &Handle, channel: ChannelId, status: u8) {
    if handle
        .exit_status_request(channel, u32::from(status))
        .await
        .is_err()
    {
        tracing::debug!(status, "failed to deliver exit-status to client");
    }
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}
