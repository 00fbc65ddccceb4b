//! Control channel (C8): a Redis pub/sub subscriber on
//! `bot_commands:<connectionId>` that turns an operator `leave` command into
//! a `CancellationToken` trip. Connection handling opens a `Client` and
//! hands back a task the caller spawns; the stop-latch shape is the same
//! `CancellationToken` the controller shares with the rest of the run.

use redis::aio::PubSub;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::errors::BotError;

#[derive(Debug, Deserialize)]
struct ControlCommand {
    action: String,
}

/// Builds the per-connection pub/sub topic name.
#[must_use]
pub fn topic_for(connection_id: &str) -> String {
    format!("bot_commands:{connection_id}")
}

/// Subscribes to the control topic and drives `stop_token` when a `leave`
/// command arrives. Runs until the connection drops or `stop_token` trips
/// for any other reason, at which point it returns so the caller's
/// `tokio::select!` can move on.
#[instrument(skip(redis_url, stop_token), fields(connection_id = %connection_id))]
pub async fn run(
    redis_url: &str,
    connection_id: &str,
    stop_token: CancellationToken,
) -> Result<(), BotError> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| crate::errors::RegistryError::Redis(e.to_string()))?;
    let connection = client
        .get_async_connection()
        .await
        .map_err(|e| crate::errors::RegistryError::Redis(e.to_string()))?;
    let mut pubsub: PubSub = connection.into_pubsub();

    let topic = topic_for(connection_id);
    pubsub
        .subscribe(&topic)
        .await
        .map_err(|e| crate::errors::RegistryError::Redis(e.to_string()))?;
    debug!(topic = %topic, "subscribed to control channel");

    let mut stream = pubsub.into_on_message();
    loop {
        tokio::select! {
            () = stop_token.cancelled() => return Ok(()),
            message = futures::StreamExt::next(&mut stream) => {
                let Some(message) = message else {
                    debug!("control channel connection closed");
                    return Ok(());
                };
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "control channel payload decode failed");
                        continue;
                    }
                };
                handle_payload(&payload, &stop_token);
            }
        }
    }
}

fn handle_payload(payload: &str, stop_token: &CancellationToken) {
    match serde_json::from_str::<ControlCommand>(payload) {
        Ok(command) if command.action == "leave" => {
            debug!("received leave command over control channel");
            stop_token.cancel();
        }
        Ok(command) => {
            debug!(action = %command.action, "ignoring unrecognized control command");
        }
        Err(err) => {
            warn!(error = %err, payload = %payload, "malformed control channel payload");
        }
    }
}
