//! # Estadísticas de Servicio
//! src/logger/stats.rs
//!
//! Listener de fin de evento que mantiene, en los datos agregados del
//! logger, cuántas veces terminó un evento y cuál fue el más lento y el
//! más rápido. La lectura pasa por `get_num_data`/`get_str_data`, así que
//! funciona igual desde el origen o desde un hijo.

use std::fmt;

use serde::Serialize;

use crate::error::IpcError;
use crate::logger::core::Logger;
use crate::logger::event::LogEvent;

pub const NUM_REQ: &str = "NUM_REQ";
pub const MAX_REQ_TIME: &str = "MAX_REQ_TIME";
pub const MAX_REQ: &str = "MAX_REQ";
pub const MIN_REQ_TIME: &str = "MIN_REQ_TIME";
pub const MIN_REQ: &str = "MIN_REQ";

pub struct ServiceStats;

impl ServiceStats {
    /// Registra el listener para los eventos llamados `event_name`
    ///
    /// `label_key` es la clave de `str_data` que identifica cada evento
    /// (por ejemplo el peer o la ruta pedida) y se guarda junto al máximo
    /// y al mínimo.
    pub fn install(logger: &Logger, event_name: &str, label_key: &str) {
        let event_name = event_name.to_string();
        let label_key = label_key.to_string();

        logger.on_ev_end(Box::new(move |logger: &Logger, event: &LogEvent| {
            if event.name() != event_name {
                return;
            }

            let duration = event.duration_ms() as f64;
            let label = event.str_data.get(&label_key).cloned().unwrap_or_default();

            let (new_max, new_min) = logger.with_num_data(|nd| {
                let count = nd.entry(NUM_REQ.to_string()).or_insert(0.0);
                *count += 1.0;
                let first = *count == 1.0;

                let new_max = first || duration > nd.get(MAX_REQ_TIME).copied().unwrap_or(0.0);
                if new_max {
                    nd.insert(MAX_REQ_TIME.to_string(), duration);
                }
                let new_min = first || duration < nd.get(MIN_REQ_TIME).copied().unwrap_or(0.0);
                if new_min {
                    nd.insert(MIN_REQ_TIME.to_string(), duration);
                }
                (new_max, new_min)
            });

            if new_max || new_min {
                logger.with_str_data(|sd| {
                    if new_max {
                        sd.insert(MAX_REQ.to_string(), label.clone());
                    }
                    if new_min {
                        sd.insert(MIN_REQ.to_string(), label.clone());
                    }
                });
            }
        }));
    }

    /// Lee las estadísticas actuales desde cualquier proceso
    pub fn snapshot(logger: &Logger) -> Result<StatsSnapshot, IpcError> {
        Ok(StatsSnapshot {
            num_requests: logger.get_num_data(NUM_REQ)? as u64,
            max_time_ms: logger.get_num_data(MAX_REQ_TIME)?,
            max_label: logger.get_str_data(MAX_REQ)?,
            min_time_ms: logger.get_num_data(MIN_REQ_TIME)?,
            min_label: logger.get_str_data(MIN_REQ)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub num_requests: u64,
    pub max_time_ms: f64,
    pub max_label: String,
    pub min_time_ms: f64,
    pub min_label: String,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Num Requests: {}", self.num_requests)?;
        writeln!(f, "Max Srvc Time: {}ms ; {}", self.max_time_ms, self.max_label)?;
        write!(f, "Min Srvc Time: {}ms ; {}", self.min_time_ms, self.min_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Evento ya terminado con la duración indicada
    fn finished(name: &str, label: &str, duration_ms: i64) -> LogEvent {
        let record = format!(
            "{}\nEVT_START=1000\nEVT_END=1000\nEVT_DUR={}\npeer=\"{}\"\n",
            name, duration_ms, label
        );
        LogEvent::deserialize(&record).unwrap()
    }

    fn notify_end(logger: &Arc<Logger>, event: &LogEvent) {
        logger.event_ended(event);
    }

    #[test]
    fn test_empty_snapshot() {
        let logger = Logger::new();
        ServiceStats::install(&logger, "CONN_EV", "peer");
        let snap = ServiceStats::snapshot(&logger).unwrap();
        assert_eq!(snap.num_requests, 0);
        assert_eq!(snap.max_label, "");
        assert_eq!(snap.min_time_ms, 0.0);
    }

    #[test]
    fn test_live_events_are_counted() {
        let logger = Arc::new(Logger::new());
        ServiceStats::install(&logger, "CONN_EV", "peer");

        for peer in ["a", "b", "c"] {
            let mut event = logger.create_event("CONN_EV").with_str("peer", peer);
            event.start();
            event.end();
        }
        // Otros nombres se ignoran
        let mut other = logger.create_event("OTHER");
        other.start();
        other.end();

        let snap = ServiceStats::snapshot(&logger).unwrap();
        assert_eq!(snap.num_requests, 3);
    }

    #[test]
    fn test_tracks_max_and_min() {
        let logger = Arc::new(Logger::new());
        ServiceStats::install(&logger, "CONN_EV", "peer");

        notify_end(&logger, &finished("CONN_EV", "medio", 20));
        notify_end(&logger, &finished("CONN_EV", "lento", 50));
        notify_end(&logger, &finished("CONN_EV", "rapido", 5));

        let snap = ServiceStats::snapshot(&logger).unwrap();
        assert_eq!(snap.num_requests, 3);
        assert_eq!(snap.max_time_ms, 50.0);
        assert_eq!(snap.max_label, "lento");
        assert_eq!(snap.min_time_ms, 5.0);
        assert_eq!(snap.min_label, "rapido");
    }

    #[test]
    fn test_zero_duration_keeps_min() {
        let logger = Arc::new(Logger::new());
        ServiceStats::install(&logger, "CONN_EV", "peer");

        notify_end(&logger, &finished("CONN_EV", "cero", 0));
        notify_end(&logger, &finished("CONN_EV", "diez", 10));

        let snap = ServiceStats::snapshot(&logger).unwrap();
        assert_eq!(snap.min_time_ms, 0.0);
        assert_eq!(snap.min_label, "cero");
        assert_eq!(snap.max_label, "diez");
    }

    #[test]
    fn test_display() {
        let snap = StatsSnapshot {
            num_requests: 2,
            max_time_ms: 7.0,
            max_label: "x".to_string(),
            min_time_ms: 1.0,
            min_label: "y".to_string(),
        };
        assert_eq!(
            snap.to_string(),
            "Num Requests: 2\nMax Srvc Time: 7ms ; x\nMin Srvc Time: 1ms ; y"
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = StatsSnapshot {
            num_requests: 1,
            max_time_ms: 3.0,
            max_label: "p".to_string(),
            min_time_ms: 3.0,
            min_label: "p".to_string(),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["num_requests"], 1);
        assert_eq!(json["max_label"], "p");
    }
}
