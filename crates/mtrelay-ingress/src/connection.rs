//! Per-connection transport detection and frame loop (§4.10), generic over
//! any `AsyncRead + AsyncWrite` so tests can drive it over an in-memory
//! duplex pipe instead of a real socket.

use std::time::Duration;

use rand::rngs::ThreadRng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use mtrelay_crypto::aes::CtrStream;
use mtrelay_dataplane::{ConnId, DataPlane, Forwarder, OutboundSender};
use mtrelay_protocol::framing::{
    decode_compact_header, decode_medium_header, decode_padded_header, encode_compact_header,
    encode_medium_header, encode_padded_frame, TransportMode,
};
use mtrelay_protocol::obfuscation;
use mtrelay_protocol::constants::OBFUSCATED2_HEADER_LEN;

use crate::config::IngressConfig;
use crate::counters::IngressCounters;
use crate::{IngressError, Result};

enum Obfuscation {
    None,
    Active {
        read: CtrStream,
        write: CtrStream,
        target_dc: i16,
    },
}

/// Read `len` raw bytes from the socket, decrypting in place if obfuscated.
async fn read_plain<S: AsyncRead + Unpin>(
    stream: &mut S,
    len: usize,
    obfuscation: &mut Obfuscation,
) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    if let Obfuscation::Active { read, .. } = obfuscation {
        read.apply(&mut buf);
    }
    Ok(buf)
}

/// Encrypt (if obfuscated) and write raw bytes to the socket.
async fn write_plain<S: AsyncWrite + Unpin>(
    stream: &mut S,
    mut buf: Vec<u8>,
    obfuscation: &mut Obfuscation,
) -> std::io::Result<()> {
    if let Obfuscation::Active { write, .. } = obfuscation {
        write.apply(&mut buf);
    }
    stream.write_all(&buf).await
}

/// Detect the transport mode a freshly accepted connection is using,
/// consuming the one-time selector (1 byte for compact, 4 for medium and
/// padded, 64 for an obfuscated2 header) from the socket.
async fn detect_transport<S: AsyncRead + Unpin>(
    stream: &mut S,
    secrets: &[Vec<u8>],
) -> Result<(TransportMode, Obfuscation)> {
    let mut first = [0u8; 1];
    stream
        .read_exact(&mut first)
        .await
        .map_err(|e| IngressError::Read(e.to_string()))?;

    if first[0] == mtrelay_protocol::constants::COMPACT_FIRST_BYTE {
        return Ok((TransportMode::Compact, Obfuscation::None));
    }

    let mut rest = [0u8; 3];
    stream
        .read_exact(&mut rest)
        .await
        .map_err(|e| IngressError::Read(e.to_string()))?;
    let prefix = [first[0], rest[0], rest[1], rest[2]];

    match mtrelay_protocol::framing::detect_prefix(&prefix) {
        TransportMode::Medium => Ok((TransportMode::Medium, Obfuscation::None)),
        TransportMode::Padded => Ok((TransportMode::Padded, Obfuscation::None)),
        TransportMode::Compact => unreachable!("first byte already excluded compact"),
        TransportMode::Obfuscated2 => {
            let mut rest_of_header = [0u8; OBFUSCATED2_HEADER_LEN - 4];
            stream
                .read_exact(&mut rest_of_header)
                .await
                .map_err(|e| IngressError::Read(e.to_string()))?;
            let mut header = [0u8; OBFUSCATED2_HEADER_LEN];
            header[0..4].copy_from_slice(&prefix);
            header[4..].copy_from_slice(&rest_of_header);

            let (handshake, read, write) = obfuscation::detect(&header, secrets)
                .map_err(|_| IngressError::InvalidFrames)?;
            Ok((
                handshake.inner_mode,
                Obfuscation::Active {
                    read,
                    write,
                    target_dc: handshake.target_dc,
                },
            ))
        }
    }
}

async fn read_frame<S: AsyncRead + Unpin>(
    stream: &mut S,
    mode: TransportMode,
    obfuscation: &mut Obfuscation,
) -> std::io::Result<Vec<u8>> {
    match mode {
        TransportMode::Compact => {
            let first = read_plain(stream, 1, obfuscation).await?;
            let header_bytes = if first[0] == 0x7f {
                let rest = read_plain(stream, 3, obfuscation).await?;
                vec![first[0], rest[0], rest[1], rest[2]]
            } else {
                first
            };
            let header = decode_compact_header(&header_bytes)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            read_plain(stream, header.payload_len, obfuscation).await
        }
        TransportMode::Medium => {
            let header_bytes = read_plain(stream, 4, obfuscation).await?;
            let len = decode_medium_header(&header_bytes)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            read_plain(stream, len, obfuscation).await
        }
        TransportMode::Padded => {
            let header_bytes = read_plain(stream, 4, obfuscation).await?;
            let (total, effective) = decode_padded_header(&header_bytes)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let mut payload = read_plain(stream, total, obfuscation).await?;
            payload.truncate(effective);
            Ok(payload)
        }
        TransportMode::Obfuscated2 => unreachable!("inner mode is never Obfuscated2 itself"),
    }
}

async fn write_frame<S: AsyncWrite + Unpin>(
    stream: &mut S,
    mode: TransportMode,
    payload: &[u8],
    obfuscation: &mut Obfuscation,
    rng: &mut ThreadRng,
) -> std::io::Result<()> {
    let encoded = match mode {
        TransportMode::Compact => {
            let mut out = encode_compact_header(payload.len());
            out.extend_from_slice(payload);
            out
        }
        TransportMode::Medium => {
            let mut out = encode_medium_header(payload.len() as usize).to_vec();
            out.extend_from_slice(payload);
            out
        }
        TransportMode::Padded => {
            let (header, pad) = encode_padded_frame(payload.len(), rng);
            let mut out = header.to_vec();
            out.extend_from_slice(payload);
            out.extend_from_slice(&pad);
            out
        }
        TransportMode::Obfuscated2 => unreachable!("inner mode is never Obfuscated2 itself"),
    };
    write_plain(stream, encoded, obfuscation).await
}

/// Drive one accepted connection end to end: detect transport, then loop
/// reading frames and feeding them to the data plane until the socket
/// closes, an I/O error occurs, or the idle deadline is exceeded.
#[allow(clippy::too_many_arguments)]
pub async fn run_connection<S, F, O>(
    mut stream: S,
    conn_id: ConnId,
    config: &IngressConfig,
    data_plane: &DataPlane<F, O>,
    counters: &IngressCounters,
    now_fn: &(dyn Fn() -> u64 + Send + Sync),
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    F: Forwarder,
    O: OutboundSender,
{
    let (mode, mut obfuscation) =
        match detect_transport(&mut stream, &config.secrets).await {
            Ok(v) => v,
            Err(IngressError::InvalidFrames) => {
                counters
                    .invalid_frames
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(IngressError::InvalidFrames);
            }
            Err(e) => {
                counters
                    .read_errors
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(e);
            }
        };

    let target_dc = match &obfuscation {
        Obfuscation::Active { target_dc, .. } => *target_dc,
        Obfuscation::None => config.default_target_dc,
    };

    let mut rng = rand::thread_rng();

    loop {
        let frame = match tokio::time::timeout(
            config.idle_timeout,
            read_frame(&mut stream, mode, &mut obfuscation),
        )
        .await
        {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => {
                counters
                    .read_errors
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(IngressError::Read(e.to_string()));
            }
            Err(_elapsed) => return Ok(()),
        };

        counters
            .frames_received
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        counters
            .bytes_received
            .fetch_add(frame.len() as u64, std::sync::atomic::Ordering::Relaxed);

        let now = now_fn();
        match data_plane
            .handle_packet(conn_id, target_dc, &frame, now)
            .await
        {
            Ok(response) => {
                counters
                    .frames_handled
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if !response.is_empty() {
                    let write_result = tokio::time::timeout(
                        config.idle_timeout,
                        write_frame(&mut stream, mode, &response, &mut obfuscation, &mut rng),
                    )
                    .await;
                    match write_result {
                        Ok(Ok(())) => {
                            counters
                                .frames_returned
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            counters.bytes_returned.fetch_add(
                                response.len() as u64,
                                std::sync::atomic::Ordering::Relaxed,
                            );
                        }
                        Ok(Err(e)) => {
                            counters
                                .write_errors
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            return Err(IngressError::Write(e.to_string()));
                        }
                        Err(_elapsed) => return Ok(()),
                    }
                }
            }
            Err(_err) => {
                counters
                    .frames_failed
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtrelay_dataplane::RouteDecision;
    use mtrelay_types::{Target, TargetHealthMap};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use tokio::io::duplex;

    struct EchoForwarder;
    impl Forwarder for EchoForwarder {
        async fn route(
            &self,
            _target_dc: i16,
            _auth_key_id: u64,
            _payload_len: usize,
        ) -> std::result::Result<RouteDecision, String> {
            Ok(RouteDecision {
                target: Target {
                    cluster_id: 0,
                    host: "a".to_string(),
                    port: 1,
                    min_connections: 1,
                    max_connections: 1,
                },
                used_default: false,
            })
        }
    }

    struct EchoOutbound;
    impl OutboundSender for EchoOutbound {
        async fn exchange(
            &self,
            _target: &Target,
            payload: &[u8],
        ) -> std::result::Result<Vec<u8>, String> {
            Ok(payload.to_vec())
        }
    }

    fn dh_handshake_payload() -> Vec<u8> {
        let mut frame = vec![0u8; 40];
        frame[16..20].copy_from_slice(&20i32.to_le_bytes());
        frame[20..24].copy_from_slice(&0x6046_9778u32.to_le_bytes());
        frame
    }

    #[tokio::test]
    async fn compact_mode_round_trip_echoes_dh_handshake() {
        let (mut client, server) = duplex(4096);
        let data_plane = Arc::new(DataPlane::new(
            EchoForwarder,
            EchoOutbound,
            TargetHealthMap::new(),
            0,
            0,
        ));
        let counters = Arc::new(IngressCounters::default());
        let config = IngressConfig::default();

        let dp = data_plane.clone();
        let ct = counters.clone();
        let handle = tokio::spawn(async move {
            let clock = Arc::new(AtomicU64::new(1));
            let clock_fn = {
                let clock = clock.clone();
                move || clock.load(std::sync::atomic::Ordering::Relaxed)
            };
            let _ = run_connection(server, 1, &config, &dp, &ct, &clock_fn).await;
        });

        // Selector byte for compact/Abridged transport.
        client
            .write_all(&[mtrelay_protocol::constants::COMPACT_FIRST_BYTE])
            .await
            .unwrap();

        let payload = dh_handshake_payload();
        let header = encode_compact_header(payload.len());
        client.write_all(&header).await.unwrap();
        client.write_all(&payload).await.unwrap();

        let mut resp_header = [0u8; 1];
        client.read_exact(&mut resp_header).await.unwrap();
        assert_ne!(resp_header[0], 0x7f);
        let resp_len = resp_header[0] as usize * 4;
        let mut resp = vec![0u8; resp_len];
        client.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, payload);

        drop(client);
        handle.abort();

        assert_eq!(
            counters
                .frames_received
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
        assert_eq!(
            counters
                .frames_returned
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }
}
