//! `OutboundPool`: one pooled TCP connection per `(host, port)` upstream,
//! serialized per-target behind the pooled connection's own mutex so at
//! most one `exchange` is in flight per socket.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use mtrelay_types::Target;

use crate::config::OutboundConfig;
use crate::{OutboundError, Result};

type EntryKey = (String, u16);

struct PooledConn {
    socket: AsyncMutex<Option<TcpStream>>,
    last_used_unix_secs: AtomicU64,
    ever_connected: AtomicBool,
}

impl PooledConn {
    fn new(now_unix_secs: u64) -> Self {
        Self {
            socket: AsyncMutex::new(None),
            last_used_unix_secs: AtomicU64::new(now_unix_secs),
            ever_connected: AtomicBool::new(false),
        }
    }
}

/// One `AtomicU64` per stats key in §6's `outbound_*` group.
#[derive(Default)]
pub struct OutboundCounters {
    pub dials: AtomicU64,
    pub reconnects: AtomicU64,
    pub dial_errors: AtomicU64,
    pub sends: AtomicU64,
    pub send_errors: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub responses: AtomicU64,
    pub response_errors: AtomicU64,
    pub response_bytes: AtomicU64,
    pub idle_evictions: AtomicU64,
    pub pool_hits: AtomicU64,
    pub pool_misses: AtomicU64,
    pub active_sends: AtomicU64,
    pub closed_after_send: AtomicU64,
}

enum ReadOutcome {
    NoResponse { close: bool },
    Response(Vec<u8>),
    Error(String),
}

pub struct OutboundPool {
    config: OutboundConfig,
    entries: Mutex<HashMap<EntryKey, Arc<PooledConn>>>,
    pub counters: OutboundCounters,
}

impl OutboundPool {
    pub fn new(config: OutboundConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            counters: OutboundCounters::default(),
        }
    }

    /// `now_unix_secs` drives idle eviction and last-used bookkeeping; the
    /// deadlines themselves (§4.9) are wall-clock `tokio::time` timeouts.
    pub async fn exchange(
        &self,
        target: &Target,
        payload: &[u8],
        now_unix_secs: u64,
    ) -> Result<Vec<u8>> {
        if payload.len() > self.config.max_frame_size {
            return Err(OutboundError::PayloadTooLarge {
                len: payload.len(),
                max: self.config.max_frame_size,
            });
        }

        self.evict_idle(now_unix_secs).await;

        self.counters.active_sends.fetch_add(1, Ordering::Relaxed);
        let result = self.exchange_inner(target, payload, now_unix_secs).await;
        self.counters.active_sends.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn exchange_inner(
        &self,
        target: &Target,
        payload: &[u8],
        now_unix_secs: u64,
    ) -> Result<Vec<u8>> {
        let key = (target.host.clone(), target.port);
        let conn = self.get_or_create_entry(key, now_unix_secs);
        conn.last_used_unix_secs
            .store(now_unix_secs, Ordering::Relaxed);

        let mut socket_guard = conn.socket.lock().await;

        if socket_guard.is_none() {
            self.dial(&mut socket_guard, target, &conn).await?;
        }

        if self
            .write_frame(socket_guard.as_mut().expect("just dialed"), payload)
            .await
            .is_err()
        {
            self.counters.send_errors.fetch_add(1, Ordering::Relaxed);
            *socket_guard = None;
            self.dial(&mut socket_guard, target, &conn).await?;
            self.write_frame(socket_guard.as_mut().expect("just dialed"), payload)
                .await
                .map_err(|e| OutboundError::SendFailed(e.to_string()))?;
        }

        self.counters.sends.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        match self
            .read_frame(socket_guard.as_mut().expect("socket present after send"))
            .await
        {
            ReadOutcome::NoResponse { close } => {
                if close {
                    *socket_guard = None;
                    self.counters
                        .closed_after_send
                        .fetch_add(1, Ordering::Relaxed);
                }
                Ok(Vec::new())
            }
            ReadOutcome::Response(bytes) => {
                self.counters.responses.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .response_bytes
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Ok(bytes)
            }
            ReadOutcome::Error(reason) => {
                self.counters
                    .response_errors
                    .fetch_add(1, Ordering::Relaxed);
                *socket_guard = None;
                self.counters
                    .closed_after_send
                    .fetch_add(1, Ordering::Relaxed);
                Err(OutboundError::ResponseReadFailed(reason))
            }
        }
    }

    fn get_or_create_entry(&self, key: EntryKey, now_unix_secs: u64) -> Arc<PooledConn> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(conn) = entries.get(&key) {
            self.counters.pool_hits.fetch_add(1, Ordering::Relaxed);
            return conn.clone();
        }
        self.counters.pool_misses.fetch_add(1, Ordering::Relaxed);
        entries
            .entry(key)
            .or_insert_with(|| Arc::new(PooledConn::new(now_unix_secs)))
            .clone()
    }

    async fn dial(
        &self,
        socket_slot: &mut Option<TcpStream>,
        target: &Target,
        conn: &PooledConn,
    ) -> Result<()> {
        let had_prior = conn.ever_connected.swap(true, Ordering::Relaxed);
        self.counters.dials.fetch_add(1, Ordering::Relaxed);
        if had_prior {
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        }

        let addr = (target.host.as_str(), target.port);
        let dialed = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await;

        match dialed {
            Ok(Ok(stream)) => {
                *socket_slot = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => {
                self.counters.dial_errors.fetch_add(1, Ordering::Relaxed);
                Err(OutboundError::DialFailed(e.to_string()))
            }
            Err(_elapsed) => {
                self.counters.dial_errors.fetch_add(1, Ordering::Relaxed);
                Err(OutboundError::DialFailed("connect timeout".to_string()))
            }
        }
    }

    async fn write_frame(&self, socket: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);

        match tokio::time::timeout(self.config.write_timeout, socket.write_all(&buf)).await {
            Ok(inner) => inner,
            Err(_elapsed) => Err(std::io::Error::new(ErrorKind::TimedOut, "write timeout")),
        }
    }

    async fn read_frame(&self, socket: &mut TcpStream) -> ReadOutcome {
        let mut len_buf = [0u8; 4];
        match tokio::time::timeout(self.config.read_timeout, socket.read_exact(&mut len_buf))
            .await
        {
            Err(_elapsed) => return ReadOutcome::NoResponse { close: false },
            Ok(Err(e)) => return classify_read_error(&e),
            Ok(Ok(())) => {}
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > self.config.max_frame_size {
            return ReadOutcome::Error(format!(
                "response length {len} exceeds max frame size {}",
                self.config.max_frame_size
            ));
        }

        let mut payload = vec![0u8; len];
        match tokio::time::timeout(self.config.read_timeout, socket.read_exact(&mut payload))
            .await
        {
            Err(_elapsed) => ReadOutcome::NoResponse { close: false },
            Ok(Err(e)) => classify_read_error(&e),
            Ok(Ok(())) => ReadOutcome::Response(payload),
        }
    }

    async fn evict_idle(&self, now_unix_secs: u64) {
        let idle_secs = self.config.idle_timeout.as_secs();
        let stale: Vec<(EntryKey, Arc<PooledConn>)> = {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .filter(|(_, conn)| {
                    now_unix_secs.saturating_sub(conn.last_used_unix_secs.load(Ordering::Relaxed))
                        >= idle_secs
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        if stale.is_empty() {
            return;
        }

        {
            let mut entries = self.entries.lock().unwrap();
            for (key, _) in &stale {
                entries.remove(key);
            }
        }

        for (_, conn) in stale {
            let mut socket_guard = conn.socket.lock().await;
            *socket_guard = None;
            self.counters.idle_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of entries currently holding a live socket.
    pub async fn active_conns(&self) -> usize {
        let conns: Vec<Arc<PooledConn>> = self.entries.lock().unwrap().values().cloned().collect();
        let mut count = 0;
        for conn in conns {
            if conn.socket.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Idempotent: closes every pooled socket.
    pub async fn close(&self) {
        let conns: Vec<Arc<PooledConn>> = self.entries.lock().unwrap().values().cloned().collect();
        for conn in conns {
            *conn.socket.lock().await = None;
        }
    }
}

fn classify_read_error(e: &std::io::Error) -> ReadOutcome {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            ReadOutcome::NoResponse { close: true }
        }
        _ => ReadOutcome::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn test_config() -> OutboundConfig {
        OutboundConfig {
            connect_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(90),
            max_frame_size: 1024,
        }
    }

    fn target_for(addr: std::net::SocketAddr) -> Target {
        Target {
            cluster_id: 0,
            host: addr.ip().to_string(),
            port: addr.port(),
            min_connections: 1,
            max_connections: 1,
        }
    }

    #[tokio::test]
    async fn rejects_oversized_payload() {
        let pool = OutboundPool::new(test_config());
        let target = Target {
            cluster_id: 0,
            host: "127.0.0.1".to_string(),
            port: 1,
            min_connections: 1,
            max_connections: 1,
        };
        let payload = vec![0u8; 2048];
        let err = pool.exchange(&target, &payload, 1).await.unwrap_err();
        assert!(matches!(err, OutboundError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn echoes_a_response_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            socket.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            socket.read_exact(&mut payload).await.unwrap();

            let mut response = Vec::new();
            response.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            response.extend_from_slice(&payload);
            socket.write_all(&response).await.unwrap();
        });

        let pool = OutboundPool::new(test_config());
        let target = target_for(addr);
        let response = pool.exchange(&target, b"hello", 1).await.unwrap();
        assert_eq!(response, b"hello");
        assert_eq!(pool.counters.dials.load(Ordering::Relaxed), 1);
        assert_eq!(pool.counters.sends.load(Ordering::Relaxed), 1);
        assert_eq!(pool.counters.responses.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn no_response_within_deadline_is_not_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            socket.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            socket.read_exact(&mut payload).await.unwrap();
            // Never responds; hold the connection open past the read deadline.
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let pool = OutboundPool::new(test_config());
        let target = target_for(addr);
        let response = pool.exchange(&target, b"ping", 1).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn dial_failure_is_reported() {
        let pool = OutboundPool::new(test_config());
        // Port 0 never accepts connections from a client dial.
        let target = Target {
            cluster_id: 0,
            host: "127.0.0.1".to_string(),
            port: 1,
            min_connections: 1,
            max_connections: 1,
        };
        let err = pool.exchange(&target, b"x", 1).await.unwrap_err();
        assert!(matches!(err, OutboundError::DialFailed(_)));
        assert_eq!(pool.counters.dial_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn idle_eviction_drops_stale_entries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut len_buf = [0u8; 4];
                    if socket.read_exact(&mut len_buf).await.is_err() {
                        return;
                    }
                    let len = u32::from_le_bytes(len_buf) as usize;
                    let mut payload = vec![0u8; len];
                    if socket.read_exact(&mut payload).await.is_err() {
                        return;
                    }
                    let mut response = Vec::new();
                    response.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                    response.extend_from_slice(&payload);
                    let _ = socket.write_all(&response).await;
                });
            }
        });

        let mut config = test_config();
        config.idle_timeout = Duration::from_secs(10);
        let pool = OutboundPool::new(config);
        let target = target_for(addr);

        pool.exchange(&target, b"first", 100).await.unwrap();
        assert_eq!(pool.active_conns().await, 1);

        // Second exchange long after idle-timeout evicts the stale entry
        // and dials again.
        pool.exchange(&target, b"second", 200).await.unwrap();
        assert_eq!(pool.counters.idle_evictions.load(Ordering::Relaxed), 1);
        assert_eq!(pool.counters.dials.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let pool = OutboundPool::new(test_config());
        pool.close().await;
        pool.close().await;
    }
}
