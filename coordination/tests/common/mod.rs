//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use nano_coordination::notify::{
    DeliveryError, DeliveryReceipt, MemoryTemplates, MessagingBackend, OutboundMessage,
    SecretResolver,
};
use nano_coordination::plan::BuiltinTemplates;
use nano_coordination::verifier::{ChannelError, CommandChannel, ShowVersionParser};
use nano_coordination::{AppDeps, Application, MemoryStore, Principal};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn show_version(register: &str) -> String {
    format!(
        "Cisco IOS Software, C2900 Software (C2900-UNIVERSALK9-M), Version 15.4(3)M2, RELEASE SOFTWARE (fc2)\n\
         edge-rtr-1 uptime is 2 hours, 1 minute\n\
         Configuration register is {register}\n"
    )
}

/// What the fake device answers
#[derive(Debug, Clone)]
pub enum DeviceReply {
    Output(String),
    Fail(String),
    Hang,
}

pub struct FakeChannel {
    reply: Mutex<DeviceReply>,
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeChannel {
    pub fn new(reply: DeviceReply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn netsim() -> Arc<Self> {
        Self::new(DeviceReply::Output("Cisco IOS Software, NETSIM".to_string()))
    }

    pub fn set_reply(&self, reply: DeviceReply) {
        *self.reply.lock().unwrap() = reply;
    }
}

#[async_trait]
impl CommandChannel for FakeChannel {
    async fn execute(&self, device: &str, args: &[&str]) -> Result<String, ChannelError> {
        self.calls.lock().unwrap().push((
            device.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        ));
        let reply = self.reply.lock().unwrap().clone();
        match reply {
            DeviceReply::Output(raw) => Ok(raw),
            DeviceReply::Fail(stderr) => Err(ChannelError::Failed {
                code: Some(255),
                stderr,
            }),
            DeviceReply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
        }
    }
}

/// Records every message instead of sending it
#[derive(Default)]
pub struct RecordingBackend {
    pub sent: Mutex<Vec<(OutboundMessage, String)>>,
    pub reject: bool,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Default::default()
        })
    }

    pub fn messages(&self) -> Vec<(OutboundMessage, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingBackend for RecordingBackend {
    async fn send(
        &self,
        message: &OutboundMessage,
        token: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if self.reject {
            return Err(DeliveryError::Rejected {
                status: 401,
                body: "invalid token".to_string(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((message.clone(), token.to_string()));
        Ok(DeliveryReceipt {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

/// Variables visible to `%ENV{..}` resolution in tests
pub fn test_secrets() -> SecretResolver {
    SecretResolver::with_lookup(|name| match name {
        "BOT_TOKEN" => Some("abc123".to_string()),
        "ROOM_ID" => Some("room-42".to_string()),
        _ => None,
    })
}

pub struct Harness {
    pub app: Application,
    pub store: Arc<MemoryStore>,
    pub channel: Arc<FakeChannel>,
    pub backend: Arc<RecordingBackend>,
}

pub fn harness(channel: Arc<FakeChannel>, backend: Arc<RecordingBackend>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let app = Application::setup(AppDeps {
        store: store.clone(),
        principal: Principal::admin(),
        config_templates: Arc::new(BuiltinTemplates),
        renderer: Arc::new(MemoryTemplates::builtin()),
        backend: backend.clone(),
        secrets: test_secrets(),
        channel: channel.clone(),
        parser: Arc::new(ShowVersionParser),
        verify_timeout: Duration::from_millis(200),
    });
    Harness {
        app,
        store,
        channel,
        backend,
    }
}
