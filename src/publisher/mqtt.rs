//! Publishes accepted command events to an MQTT broker

use crate::event::Event;
use crate::publisher::{Publisher, PublisherError};
use rumqttc::{Client, ConnectionError, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttPublisherConfig {
    /// Broker address as `host:port`, port defaults to 1883
    pub server: String,
    pub client_id: String,
    pub topic: String,
    pub qos: u8,
    pub user: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttPublisherConfig {
    fn default() -> Self {
        Self {
            server: "localhost:1883".to_string(),
            client_id: "bcibridge".to_string(),
            topic: "bci/commands".to_string(),
            qos: 0,
            user: None,
            password: None,
            keep_alive_secs: 5,
        }
    }
}

impl MqttPublisherConfig {
    fn host_and_port(&self) -> Result<(String, u16), PublisherError> {
        let mut parts = self.server.splitn(2, ':');
        let host = parts.next().unwrap_or_default().trim();
        if host.is_empty() {
            return Err(PublisherError::StartFailed(format!(
                "Invalid MQTT server address: {}",
                self.server
            )));
        }
        let port = match parts.next() {
            Some(port) => port.trim().parse().map_err(|_| {
                PublisherError::StartFailed(format!("Invalid MQTT port in {}", self.server))
            })?,
            None => 1883,
        };
        Ok((host.to_string(), port))
    }

    fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }
}

struct Session {
    client: Client,
    running: Arc<AtomicBool>,
    event_loop: JoinHandle<()>,
}

pub struct MqttPublisher {
    config: MqttPublisherConfig,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
}

impl MqttPublisher {
    pub fn new(config: MqttPublisherConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MqttPublisherConfig {
        &self.config
    }

    /// True once the broker acknowledged the connection
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn options(&self) -> Result<MqttOptions, PublisherError> {
        let (host, port) = self.config.host_and_port()?;
        let mut mqtt_options = MqttOptions::new(self.config.client_id.clone(), host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(1)));
        if let Some(user) = &self.config.user {
            mqtt_options.set_credentials(
                user.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        Ok(mqtt_options)
    }
}

fn drive_connection(
    mut connection: rumqttc::Connection,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
) {
    for notification in connection.iter() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match notification {
            Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                info!("MQTT broker connected");
                connected.store(true, Ordering::SeqCst);
            }
            Ok(rumqttc::Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!("MQTT connection lost: {}", e);
                } else {
                    debug!("MQTT connection attempt failed: {}", e);
                }
                thread::sleep(Duration::from_secs(1));
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    debug!("MQTT event loop finished");
}

impl Publisher for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn start(&self) -> Result<(), PublisherError> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_some() {
            return Ok(());
        }

        let (client, connection) = Client::new(self.options()?, 100);
        let running = Arc::new(AtomicBool::new(true));
        let event_loop = {
            let running = running.clone();
            let connected = self.connected.clone();
            thread::Builder::new()
                .name("mqtt-publisher".to_string())
                .spawn(move || drive_connection(connection, running, connected))?
        };

        info!(
            "MQTT publisher started for {} on topic {}",
            self.config.server, self.config.topic
        );
        *session = Some(Session {
            client,
            running,
            event_loop,
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), PublisherError> {
        let Some(session) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };

        session.running.store(false, Ordering::SeqCst);
        if let Err(e) = session.client.try_disconnect() {
            warn!("MQTT disconnect request failed: {}", e);
        }
        // The event loop may sit in a reconnect attempt; it exits on its next iteration.
        drop(session.event_loop);
        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT publisher stopped");
        Ok(())
    }

    fn publish(&self, event: &Event) -> Result<(), PublisherError> {
        let Some(command) = event.as_command() else {
            return Ok(());
        };
        let payload = serde_json::to_vec(command)?;

        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = session.as_ref() else {
            return Err(PublisherError::NotReady(self.name().to_string()));
        };
        session
            .client
            .try_publish(self.config.topic.clone(), self.config.qos(), false, payload)
            .map_err(|e| {
                error!("Failed to queue MQTT message: {}", e);
                PublisherError::Send(e.to_string())
            })
    }

    fn is_ready(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop MQTT publisher: {}", e);
        }
    }
}
