//! `DataPlane::handle_packet`, the procedure the ingress layer calls for
//! every inbound frame once its transport framing has been stripped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mtrelay_protocol::{parse_mtproto_packet, ParsedPacket};
use mtrelay_router::RateLimiter;
use mtrelay_types::TargetHealthMap;
use tokio::sync::Mutex;

use crate::forwarder::{Forwarder, OutboundSender};
use crate::session::{ConnId, Session};
use crate::{DataPlaneError, Result};

const OUTBOUND_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct DataPlaneCounters {
    pub parse_errors: AtomicU64,
    pub dropped: AtomicU64,
    pub rejected_by_dh: AtomicU64,
    pub rejected_by_limit: AtomicU64,
    pub route_errors: AtomicU64,
    pub outbound_errors: AtomicU64,
    pub sessions_created: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub packets_total: AtomicU64,
    pub packets_encrypted: AtomicU64,
    pub packets_handshake: AtomicU64,
    pub bytes_total: AtomicU64,
}

impl DataPlaneCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns session state, counters and the health map; calls through the
/// `Forwarder`/`OutboundSender` seams to actually resolve and reach an
/// upstream.
pub struct DataPlane<F, O> {
    forwarder: F,
    outbound: O,
    health: TargetHealthMap,
    dh_limiter: RateLimiter,
    session_limit: usize,
    sessions: Mutex<HashMap<ConnId, Session>>,
    pub counters: DataPlaneCounters,
}

impl<F, O> DataPlane<F, O>
where
    F: Forwarder,
    O: OutboundSender,
{
    pub fn new(
        forwarder: F,
        outbound: O,
        health: TargetHealthMap,
        session_limit: usize,
        dh_rate_limit: i64,
    ) -> Self {
        Self {
            forwarder,
            outbound,
            health,
            dh_limiter: RateLimiter::new(dh_rate_limit),
            session_limit,
            sessions: Mutex::new(HashMap::new()),
            counters: DataPlaneCounters::default(),
        }
    }

    pub async fn handle_packet(
        &self,
        conn_id: ConnId,
        target_dc: i16,
        frame: &[u8],
        now_unix_secs: u64,
    ) -> Result<Vec<u8>> {
        let packet = match parse_mtproto_packet(frame) {
            Ok(packet) => packet,
            Err(err) => {
                DataPlaneCounters::bump(&self.counters.parse_errors);
                DataPlaneCounters::bump(&self.counters.dropped);
                return Err(DataPlaneError::BadFrame(err.to_string()));
            }
        };

        if packet.is_handshake() && !self.dh_limiter.allow(now_unix_secs) {
            DataPlaneCounters::bump(&self.counters.rejected_by_dh);
            DataPlaneCounters::bump(&self.counters.dropped);
            return Err(DataPlaneError::DhRateExceeded);
        }

        let auth_key_id = match &packet {
            ParsedPacket::Encrypted { auth_key_id, .. } => *auth_key_id,
            ParsedPacket::DhHandshake { .. } => 0,
        };

        {
            let mut sessions = self.sessions.lock().await;
            if !sessions.contains_key(&conn_id) {
                if self.session_limit > 0 && sessions.len() >= self.session_limit {
                    DataPlaneCounters::bump(&self.counters.rejected_by_limit);
                    DataPlaneCounters::bump(&self.counters.dropped);
                    return Err(DataPlaneError::ConnectionLimitReached);
                }
                sessions.insert(conn_id, Session::new(now_unix_secs));
                DataPlaneCounters::bump(&self.counters.sessions_created);
            }

            let session = sessions
                .get_mut(&conn_id)
                .expect("just inserted or already present");
            session.touch(now_unix_secs);
            session.state = session.state.advance(&packet);

            match session.state {
                mtrelay_protocol::SessionState::Encrypted => {
                    DataPlaneCounters::bump(&self.counters.packets_encrypted)
                }
                mtrelay_protocol::SessionState::Handshake => {
                    DataPlaneCounters::bump(&self.counters.packets_handshake)
                }
                mtrelay_protocol::SessionState::Init => {}
            }
        }

        DataPlaneCounters::bump(&self.counters.packets_total);
        self.counters
            .bytes_total
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        let decision = match self
            .forwarder
            .route(target_dc, auth_key_id, frame.len())
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                DataPlaneCounters::bump(&self.counters.route_errors);
                DataPlaneCounters::bump(&self.counters.dropped);
                return Err(DataPlaneError::RouteFailed(err));
            }
        };

        let exchange = tokio::time::timeout(
            OUTBOUND_DEADLINE,
            self.outbound.exchange(&decision.target, frame),
        )
        .await;

        match exchange {
            Ok(Ok(response)) => {
                self.health.mark_healthy(&decision.target.key()).await;
                Ok(response)
            }
            Ok(Err(err)) => {
                self.health.mark_unhealthy(&decision.target.key()).await;
                DataPlaneCounters::bump(&self.counters.outbound_errors);
                DataPlaneCounters::bump(&self.counters.dropped);
                Err(DataPlaneError::OutboundFailed(err))
            }
            Err(_elapsed) => {
                self.health.mark_unhealthy(&decision.target.key()).await;
                DataPlaneCounters::bump(&self.counters.outbound_errors);
                DataPlaneCounters::bump(&self.counters.dropped);
                Err(DataPlaneError::OutboundFailed("deadline exceeded".into()))
            }
        }
    }

    pub async fn close_connection(&self, conn_id: ConnId) {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(&conn_id).is_some() {
            DataPlaneCounters::bump(&self.counters.sessions_closed);
        }
    }

    pub async fn prune_idle(&self, idle_secs: u64, now_unix_secs: u64) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_idle(idle_secs, now_unix_secs));
        let pruned = before - sessions.len();
        self.counters
            .sessions_closed
            .fetch_add(pruned as u64, Ordering::Relaxed);
        pruned
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub fn session_limit(&self) -> usize {
        self.session_limit
    }
}
