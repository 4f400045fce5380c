use crate::agent::TrackingAgent;
use crate::error::AgentResult;
use crate::source::ChannelSource;
use crate::types::{Fix, Visit};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// One recorded platform event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayEvent {
    Fix(Fix),
    Visit(Visit),
    Network { timestamp: f64, reachable: bool },
}

impl ReplayEvent {
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            ReplayEvent::Fix(fix) => Some(fix.timestamp),
            ReplayEvent::Visit(visit) => visit.departure.or(visit.arrival),
            ReplayEvent::Network { timestamp, .. } => Some(*timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplayLog {
    events: Vec<ReplayEvent>,
}

/// Load `{"events": [...]}` from disk
pub fn load_events(path: &Path) -> AgentResult<Vec<ReplayEvent>> {
    let file = File::open(path)?;
    let log: ReplayLog = serde_json::from_reader(BufReader::new(file))?;
    Ok(log.events)
}

/// Wall-clock wait between two recorded events. `speedup <= 0` disables pacing.
pub fn pacing_delay(previous: Option<f64>, next: Option<f64>, speedup: f64) -> Duration {
    match (previous, next) {
        (Some(prev), Some(next)) if speedup > 0.0 && next > prev => {
            Duration::from_secs_f64((next - prev) / speedup)
        }
        _ => Duration::ZERO,
    }
}

/// Feed recorded events to the agent the way a platform would: fixes go to
/// the live stream when one is open, otherwise they arrive as passive fixes.
pub async fn replay_events(
    agent: &TrackingAgent,
    source: &ChannelSource,
    events: Vec<ReplayEvent>,
    speedup: f64,
) -> usize {
    let mut previous = None;
    let mut delivered = 0;

    for event in events {
        let next = event.timestamp();
        let delay = pacing_delay(previous, next, speedup);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if next.is_some() {
            previous = next;
        }

        match event {
            ReplayEvent::Fix(fix) => {
                if !source.push_live(fix.clone()) {
                    agent.handle_passive_fixes(vec![fix]);
                }
            }
            ReplayEvent::Visit(visit) => agent.handle_visit(visit),
            ReplayEvent::Network { reachable, .. } => agent.set_network_reachable(reachable),
        }
        delivered += 1;

        // Let the live loop pick up a stream it just opened
        tokio::task::yield_now().await;
    }

    log::info!("Replayed {} events", delivered);
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LOG: &str = r#"{
        "events": [
            {"network": {"timestamp": 99.0, "reachable": true}},
            {"fix": {"timestamp": 100.0, "latitude": 48.1, "longitude": 11.5, "horizontal_accuracy": 8.0}},
            {"fix": {"timestamp": 130.0, "latitude": 48.101, "longitude": 11.5, "horizontal_accuracy": 8.0, "speed": 1.2}},
            {"visit": {"latitude": 48.101, "longitude": 11.5, "arrival": 200.0}}
        ]
    }"#;

    #[test]
    fn test_load_events() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LOG.as_bytes()).unwrap();

        let events = load_events(file.path()).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ReplayEvent::Network { reachable: true, .. }));
        match &events[2] {
            ReplayEvent::Fix(fix) => {
                assert_eq!(fix.speed, 1.2);
                assert_eq!(fix.altitude, 0.0);
            }
            other => panic!("expected fix, got {:?}", other),
        }
        assert_eq!(events[3].timestamp(), Some(200.0));
    }

    #[test]
    fn test_load_events_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"events\": [{\"teleport\": {}}]}").unwrap();
        assert!(load_events(file.path()).is_err());
    }

    #[test]
    fn test_pacing_delay() {
        assert_eq!(pacing_delay(Some(10.0), Some(20.0), 10.0), Duration::from_secs(1));
        assert_eq!(pacing_delay(Some(10.0), Some(20.0), 0.0), Duration::ZERO);
        assert_eq!(pacing_delay(None, Some(20.0), 1.0), Duration::ZERO);
        // out-of-order timestamps are not waited on
        assert_eq!(pacing_delay(Some(30.0), Some(20.0), 1.0), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_replay_drives_agent() {
        use crate::agent::AgentParts;
        use crate::config::TrackerTuning;
        use crate::network::NetworkMonitor;
        use crate::notifier::LogNotifier;
        use crate::store::MemoryStore;
        use crate::upload::tests::MockTransport;
        use std::sync::Arc;

        let source = Arc::new(ChannelSource::default());
        let transport = Arc::new(MockTransport::new());
        let agent = TrackingAgent::new(AgentParts {
            store: Arc::new(MemoryStore::new()),
            source: source.clone(),
            transport: transport.clone(),
            notifier: Arc::new(LogNotifier),
            network: NetworkMonitor::default(),
            tuning: TrackerTuning::default(),
        })
        .unwrap();
        agent.set_server_host("http://localhost:8080").unwrap();

        let log: ReplayLog = serde_json::from_str(LOG).unwrap();
        let delivered = replay_events(&agent, &source, log.events, 0.0).await;
        assert_eq!(delivered, 4);

        // the arrival visit flushes both fixes
        for _ in 0..100 {
            if transport.calls() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.sent_timestamps(), vec![vec![100.0, 130.0]]);
    }
}
