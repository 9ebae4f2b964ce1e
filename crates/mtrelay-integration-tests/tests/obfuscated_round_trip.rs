//! S6: a client speaking obfuscated2 with a padded inner transport gets its
//! DH-handshake function echoed back through the full ingress → data-plane
//! → outbound path, wrapped back up in a padded-mode response frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mtrelay_crypto::aes::{ctr_apply, CtrStream};
use mtrelay_crypto::hash::sha256;
use mtrelay_dataplane::{DataPlane, Forwarder, OutboundSender, RouteDecision};
use mtrelay_ingress::connection::run_connection;
use mtrelay_ingress::{IngressConfig, IngressCounters};
use mtrelay_protocol::constants::{OBFUSCATED2_HEADER_LEN, PROTO_TAG_PADDED};
use mtrelay_protocol::framing::{decode_padded_header, encode_padded_frame};
use mtrelay_types::{Target, TargetHealthMap};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

struct EchoForwarder;
impl Forwarder for EchoForwarder {
    async fn route(
        &self,
        target_dc: i16,
        _auth_key_id: u64,
        _payload_len: usize,
    ) -> Result<RouteDecision, String> {
        assert_eq!(target_dc, 3, "obfuscated2 header's target-DC must reach the forwarder");
        Ok(RouteDecision {
            target: Target {
                cluster_id: 3,
                host: "backend".to_string(),
                port: 443,
                min_connections: 1,
                max_connections: 1,
            },
            used_default: false,
        })
    }
}

struct EchoOutbound;
impl OutboundSender for EchoOutbound {
    async fn exchange(&self, _target: &Target, payload: &[u8]) -> Result<Vec<u8>, String> {
        Ok(payload.to_vec())
    }
}

fn reversed(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}

/// Mirrors `mtrelay_protocol::obfuscation`'s private key derivation so the
/// test can play the client side of the handshake without depending on that
/// module's internals.
struct ClientKeys {
    read_key: [u8; 32],
    read_iv: [u8; 16],
    write_key: [u8; 32],
    write_iv: [u8; 16],
}

fn derive_client_keys(header: &[u8; OBFUSCATED2_HEADER_LEN], secret: &[u8]) -> ClientKeys {
    let read_iv: [u8; 16] = header[40..56].try_into().unwrap();
    let write_iv: [u8; 16] = reversed(&header[8..24]).try_into().unwrap();

    let mut read_material = header[8..40].to_vec();
    read_material.extend_from_slice(secret);
    let read_key = sha256(&read_material);

    let mut write_material = reversed(&header[24..56]);
    write_material.extend_from_slice(secret);
    let write_key = sha256(&write_material);

    ClientKeys {
        read_key,
        read_iv,
        write_key,
        write_iv,
    }
}

fn dh_handshake_payload() -> Vec<u8> {
    let mut frame = vec![0u8; 40];
    frame[16..20].copy_from_slice(&20i32.to_le_bytes());
    frame[20..24].copy_from_slice(&0x6046_9778u32.to_le_bytes());
    frame
}

#[tokio::test]
async fn obfuscated2_padded_round_trip_echoes_dh_handshake() {
    let secret = vec![0xAAu8; 16];

    let mut raw_header = [0u8; OBFUSCATED2_HEADER_LEN];
    for (i, b) in raw_header.iter_mut().enumerate() {
        *b = i as u8;
    }

    let keys = derive_client_keys(&raw_header, &secret);

    let mut plaintext_header = raw_header;
    plaintext_header[56..60].copy_from_slice(&PROTO_TAG_PADDED.to_le_bytes());
    plaintext_header[60..62].copy_from_slice(&3i16.to_le_bytes());

    // The client encrypts the header with its write stream, which is the
    // server's read stream (same key/IV pair).
    let header_ciphertext = ctr_apply(&keys.read_key, &keys.read_iv, &plaintext_header).unwrap();

    let mut client_write_stream = CtrStream::new(&keys.read_key, &keys.read_iv).unwrap();
    // Advance in lock-step with the server, which treats the 64 header
    // bytes as already consumed keystream.
    let mut discard = [0u8; OBFUSCATED2_HEADER_LEN];
    client_write_stream.apply(&mut discard);

    let mut client_read_stream = CtrStream::new(&keys.write_key, &keys.write_iv).unwrap();
    let mut discard = [0u8; OBFUSCATED2_HEADER_LEN];
    client_read_stream.apply(&mut discard);

    let (mut client, server) = duplex(8192);

    let data_plane = Arc::new(DataPlane::new(
        EchoForwarder,
        EchoOutbound,
        TargetHealthMap::new(),
        0,
        0,
    ));
    let counters = Arc::new(IngressCounters::default());
    let config = IngressConfig {
        secrets: vec![secret],
        ..IngressConfig::default()
    };

    let dp = data_plane.clone();
    let ct = counters.clone();
    let handle = tokio::spawn(async move {
        let clock = Arc::new(AtomicU64::new(1));
        let clock_fn = {
            let clock = clock.clone();
            move || clock.load(Ordering::Relaxed)
        };
        let _ = run_connection(server, 1, &config, &dp, &ct, &clock_fn).await;
    });

    client.write_all(&header_ciphertext).await.unwrap();

    let payload = dh_handshake_payload();
    let mut rng = rand::thread_rng();
    let (frame_header, pad) = encode_padded_frame(payload.len(), &mut rng);
    let mut plaintext_frame = frame_header.to_vec();
    plaintext_frame.extend_from_slice(&payload);
    plaintext_frame.extend_from_slice(&pad);

    let mut ciphertext_frame = plaintext_frame.clone();
    client_write_stream.apply(&mut ciphertext_frame);
    client.write_all(&ciphertext_frame).await.unwrap();

    let mut resp_header = [0u8; 4];
    client.read_exact(&mut resp_header).await.unwrap();
    client_read_stream.apply(&mut resp_header);
    let (total, effective) = decode_padded_header(&resp_header).unwrap();

    let mut resp_body = vec![0u8; total];
    client.read_exact(&mut resp_body).await.unwrap();
    client_read_stream.apply(&mut resp_body);
    resp_body.truncate(effective);

    assert_eq!(resp_body, payload);

    drop(client);
    handle.abort();

    assert_eq!(counters.frames_received.load(Ordering::Relaxed), 1);
    assert_eq!(counters.frames_returned.load(Ordering::Relaxed), 1);
}
