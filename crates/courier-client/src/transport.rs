//! Relay transport: HTTP registration and the WebSocket chat loop.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::debug;

use courier_proto::{Envelope, EnvelopeError, EnvelopeKind};

use crate::{
    config::ClientConfig,
    keys::{KeyStore, KeyStoreError},
    output,
    session::{PeerSessions, SessionError},
    tracker::DeliveryTracker,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("id already taken")]
    IdTaken,
    #[error("registration failed: {0}")]
    RegisterFailed(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Ws(#[from] tungstenite::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Claim `id` with the relay over HTTP.
pub async fn register(register_url: &str, id: &str) -> Result<(), ClientError> {
    let client = reqwest::Client::builder().use_rustls_tls().build()?;
    let resp = client
        .post(register_url)
        .json(&serde_json::json!({ "id": id }))
        .send()
        .await?;

    match resp.status() {
        StatusCode::CREATED | StatusCode::OK => Ok(()),
        StatusCode::CONFLICT => Err(ClientError::IdTaken),
        other => Err(ClientError::RegisterFailed(format!("status={other}"))),
    }
}

/// Connect to the relay and run the interactive chat loop with
/// `recipient`: announce our public key, encrypt outgoing lines from
/// stdin, decrypt incoming messages and exchange receipts. An optional
/// `initial_message` is sent as soon as key material for the recipient is
/// available.
pub async fn run_chat(
    config: &ClientConfig,
    id: &str,
    recipient: &str,
    initial_message: Option<String>,
) -> Result<(), ClientError> {
    let store = match &config.key_dir {
        Some(dir) => KeyStore::open(dir),
        None => KeyStore::open(KeyStore::default_dir()?),
    };
    // the identity pair is not consulted by routing yet, but both
    // long-term pairs come into existence together
    let (identity_public, _) = store.identity_keys()?;
    debug!(identity = %hex_fingerprint(&identity_public), "identity key loaded");
    let sessions = Arc::new(PeerSessions::new(Arc::new(store)));
    let tracker = Arc::new(DeliveryTracker::new());

    let url = format!("{}?id={}", config.ws_url(), id);
    let (socket, _) = connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();

    // All writes funnel through one task so the read path can emit
    // receipts without contending for the sink.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(tungstenite::Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let announce = Envelope::pubkey(id, recipient, sessions.local_public_key_b64()?);
    let _ = out_tx.send(announce.encode()?).await;
    output::system(&format!(
        "connected as {id}; public key sent to {recipient} (/quit to exit)"
    ));

    let mut pending = initial_message;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(frame) = frame else { break };
                match frame? {
                    tungstenite::Message::Text(text) => {
                        handle_incoming(&text, id, &sessions, &tracker, &out_tx, config.read_receipt_dwell());
                        if pending.is_some() && sessions.has_peer_key(recipient) {
                            let text = pending.take().expect("pending checked above");
                            send_message(id, recipient, &text, &sessions, &tracker, &out_tx).await?;
                        }
                    }
                    tungstenite::Message::Close(_) => break,
                    _ => {}
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == "/quit" {
                    output::system("goodbye");
                    break;
                }
                send_message(id, recipient, text, &sessions, &tracker, &out_tx).await?;
            }
        }
    }

    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

/// Connect and print every raw frame the relay forwards. Useful for
/// observing broadcast traffic; the URL carries any `?id=` itself.
pub async fn listen(ws_url: &str) -> Result<(), ClientError> {
    let (mut socket, _) = connect_async(ws_url).await?;
    output::system("connected, waiting for messages");

    while let Some(frame) = socket.next().await {
        match frame? {
            tungstenite::Message::Text(text) => output::incoming("relay", &text),
            tungstenite::Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

fn handle_incoming(
    text: &str,
    my_id: &str,
    sessions: &Arc<PeerSessions>,
    tracker: &Arc<DeliveryTracker>,
    out_tx: &mpsc::Sender<String>,
    read_dwell: Duration,
) {
    let envelope = match Envelope::decode(text.as_bytes()) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("undecodable frame: {e}");
            output::system(&format!("relay: {text}"));
            return;
        }
    };

    // our own broadcast frames come back around; acks are the exception
    if envelope.id == my_id && envelope.kind != EnvelopeKind::Ack {
        return;
    }
    // targeted traffic for somebody else (possible on broadcast paths);
    // acks name the original recipient, so they are exempt too
    if envelope.kind != EnvelopeKind::Ack
        && !envelope.recipient.is_empty()
        && envelope.recipient != my_id
    {
        return;
    }

    match envelope.kind {
        EnvelopeKind::Ack => {
            if envelope.msg_id.is_empty() {
                return;
            }
            if let Some(updated) = tracker.apply_ack(&envelope.msg_id, &envelope.body) {
                output::outgoing(&updated);
            }
        }
        EnvelopeKind::Pubkey => {
            match sessions.cache_peer_key(&envelope.id, &envelope.public_key) {
                Ok(()) => output::system(&format!("received public key from {}", envelope.id)),
                Err(e) => output::error(&format!("bad public key from {}: {e}", envelope.id)),
            }
        }
        EnvelopeKind::EncapKey => {
            match sessions.accept_encapsulation(&envelope.id, envelope.encapsulation()) {
                Ok(()) => output::system(&format!("established shared key with {}", envelope.id)),
                Err(e) => output::error(&format!("key agreement with {} failed: {e}", envelope.id)),
            }
        }
        EnvelopeKind::Error => output::error(&envelope.body),
        EnvelopeKind::Msg => {
            match sessions.decrypt_from(&envelope.id, &envelope.body) {
                Ok(plaintext) => {
                    output::incoming(&envelope.id, &String::from_utf8_lossy(&plaintext));
                }
                Err(e) => {
                    output::error(&format!("decrypt error from {}: {e}", envelope.id));
                    return;
                }
            }

            send_receipt(out_tx, my_id, &envelope.id, &envelope.msg_id, "delivered");

            // the read receipt follows after the configured dwell
            let out_tx = out_tx.clone();
            let my_id = my_id.to_string();
            let sender = envelope.id.clone();
            let msg_id = envelope.msg_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(read_dwell).await;
                send_receipt(&out_tx, &my_id, &sender, &msg_id, "read");
            });
        }
    }
}

fn send_receipt(out_tx: &mpsc::Sender<String>, my_id: &str, peer: &str, msg_id: &str, status: &str) {
    if msg_id.is_empty() {
        return;
    }
    let ack = Envelope::ack(my_id, peer, msg_id, status);
    match ack.encode() {
        Ok(text) => {
            let _ = out_tx.try_send(text);
        }
        Err(e) => debug!("failed to encode receipt: {e}"),
    }
}

async fn send_message(
    my_id: &str,
    recipient: &str,
    text: &str,
    sessions: &Arc<PeerSessions>,
    tracker: &Arc<DeliveryTracker>,
    out_tx: &mpsc::Sender<String>,
) -> Result<(), ClientError> {
    let msg_id = next_msg_id();
    match sessions.encrypt_for(recipient, text.as_bytes()) {
        Ok((blob, encapsulation)) => {
            // the encapsulation must reach the peer before the message
            if let Some(ciphertext) = encapsulation {
                let announce = Envelope::encap_key(my_id, recipient, ciphertext);
                let _ = out_tx.send(announce.encode()?).await;
            }
            let message = Envelope::msg(my_id, recipient, &msg_id, blob);
            let _ = out_tx.send(message.encode()?).await;

            let record = tracker.record_sent(&msg_id, text);
            output::outgoing(&record);
        }
        Err(e @ SessionError::MissingPeerKey(_)) => {
            output::error(&format!("cannot send yet: {e}"));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Short hex prefix of a public key, for logs only.
fn hex_fingerprint(bytes: &[u8]) -> String {
    bytes.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Sender-scoped message ids: nanoseconds since the epoch, unique within
/// a session at human typing rates.
fn next_msg_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .to_string()
}
