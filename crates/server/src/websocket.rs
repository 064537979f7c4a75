//! WebSocket UI Shell boundary (§6.1)
//!
//! One socket carries one session end to end: binary frames are raw PCM16
//! microphone audio in, raw PCM16 synthesized audio out; JSON text frames
//! carry everything else the UI Shell contract needs: text-message
//! submission, the `UserIsTyping` signal, transcript appends, and the turn
//! event stream (§3.1). The handler itself does no orchestration; it only
//! wires one `voice_agent_orchestrator::Session` to the socket and forwards
//! bytes and messages in both directions.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use voice_agent_core::{Channels, SampleRate, TranscriptEntry, TurnEvent};
use voice_agent_orchestrator::{DefaultProactiveMessageSource, Session};
use voice_agent_pipeline::HysteresisVad;

use crate::audio_bridge::{WsAudioSink, WsAudioSource};
use crate::state::AppState;

/// Inbound JSON messages the UI Shell may send (audio travels as binary
/// frames instead, see module docs).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Text { content: String },
    UserIsTyping { typing: bool },
    EndSession,
}

/// Outbound JSON messages the UI Shell receives (synthesized audio travels
/// as binary frames instead, see module docs).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    SessionStarted { session_id: String },
    Transcript(TranscriptEntry),
    Turn(TurnEvent),
    Error { message: String },
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (mic_tx, mic_rx) = std_mpsc::channel();
    let (audio_out_tx, mut audio_out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let session = match Session::start(
        &state.settings,
        state.session_client(),
        state.asr_client(),
        state.generator_client(),
        state.tts_client(),
        Arc::new(WsAudioSink::new(audio_out_tx)),
        HysteresisVad::new(state.settings.vad),
        WsAudioSource::new(mic_rx),
        Arc::new(DefaultProactiveMessageSource),
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "failed to start session");
            let _ = ws_tx
                .send(Message::Text(
                    serde_json::to_string(&ServerMessage::Error {
                        message: "Couldn't start a session, please try again.".into(),
                    })
                    .unwrap(),
                ))
                .await;
            return;
        }
    };

    info!(session_id = %session.session_id(), "websocket connection established");

    let mut events = session.take_events().expect("take_events called once per session");

    let _ = ws_tx
        .send(Message::Text(
            serde_json::to_string(&ServerMessage::SessionStarted {
                session_id: session.session_id().to_string(),
            })
            .unwrap(),
        ))
        .await;

    // Writer: interleaves turn events, transcript growth, synthesized audio,
    // and the fatal-session-expiry notice onto the socket. Transcript
    // entries are forwarded as a delta against the last-sent length rather
    // than re-snapshotted per event.
    let writer_session = session.clone();
    let mut writer_ended = session.ended_signal();
    let writer = tokio::spawn(async move {
        let mut sent = 0usize;
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            let snapshot = writer_session.transcript_snapshot();
                            for entry in &snapshot[sent..] {
                                if ws_tx
                                    .send(Message::Text(
                                        serde_json::to_string(&ServerMessage::Transcript(entry.clone())).unwrap(),
                                    ))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            sent = snapshot.len();

                            if ws_tx
                                .send(Message::Text(serde_json::to_string(&ServerMessage::Turn(event)).unwrap()))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        None => break,
                    }
                }
                audio = audio_out_rx.recv() => {
                    match audio {
                        Some(bytes) => {
                            if ws_tx.send(Message::Binary(bytes)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                changed = writer_ended.changed() => {
                    if changed.is_ok() && *writer_ended.borrow() {
                        let _ = ws_tx
                            .send(Message::Text(
                                serde_json::to_string(&ServerMessage::Error {
                                    message: "Session expired, please reconnect.".into(),
                                })
                                .unwrap(),
                            ))
                            .await;
                        break;
                    }
                }
            }
        }
    });

    // Reader: drains inbound frames until the socket closes, the client asks
    // to end the session, or the session itself goes fatally stale (§7,
    // `SessionExpired`) — that last case is the only one not signalled by the
    // socket, so it is watched for explicitly via `ended_signal()`.
    let mut ended = session.ended_signal();
    let mut next_sequence: u64 = 0;
    loop {
        tokio::select! {
            message = ws_rx.next() => {
                match message {
                    Some(Ok(Message::Binary(bytes))) => {
                        let frame = voice_agent_core::AudioFrame::from_pcm16(
                            &bytes,
                            SampleRate::Hz16000,
                            Channels::Mono,
                            next_sequence,
                        );
                        next_sequence += 1;
                        if mic_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Text { content }) => session.submit_text(content),
                        Ok(ClientMessage::UserIsTyping { typing }) => session.set_user_is_typing(typing),
                        Ok(ClientMessage::EndSession) => break,
                        Err(err) => warn!(error = %err, "ignoring malformed client message"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Err(_)) => break,
                }
            }
            changed = ended.changed() => {
                if changed.is_ok() && *ended.borrow() {
                    break;
                }
            }
        }
    }

    writer.abort();
    session.shutdown().await;
    info!(session_id = %session.session_id(), "websocket connection closed");
}
