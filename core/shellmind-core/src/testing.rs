//! In-process stand-ins for the model server, used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, ShellmindError};
use crate::service::{GenerateRequest, ModelInfo, ModelService, ServiceLauncher};

#[derive(Debug, Clone)]
pub enum StubReply {
    Text(String),
    Timeout,
    Unreachable,
}

pub struct StubService {
    reachable_from_call: Option<usize>,
    models: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<StubReply>>,
    prompts: Mutex<Vec<String>>,
    pings: AtomicUsize,
    lists: AtomicUsize,
    generates: AtomicUsize,
}

impl StubService {
    fn with_reachability(reachable_from_call: Option<usize>) -> Self {
        Self {
            reachable_from_call,
            models: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            generates: AtomicUsize::new(0),
        }
    }

    pub fn reachable() -> Self {
        Self::with_reachability(Some(1))
    }

    pub fn unreachable() -> Self {
        Self::with_reachability(None)
    }

    /// Pings fail until the `n`th call.
    pub fn reachable_after(n: usize) -> Self {
        Self::with_reachability(Some(n))
    }

    pub fn with_models(self, models: &[&str]) -> Self {
        *self.models.lock().expect("models lock") = models.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Makes `name` show up in later listings, as if it had been created.
    pub fn add_model(&self, name: &str) {
        self.models.lock().expect("models lock").push(name.to_string());
    }

    pub fn with_replies(self, replies: Vec<StubReply>) -> Self {
        *self.replies.lock().expect("replies lock") = replies.into();
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_replies(vec![StubReply::Text(text.to_string())])
    }

    pub fn ping_calls(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generates.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    fn is_up(&self, call: usize) -> bool {
        self.reachable_from_call.is_some_and(|n| call >= n)
    }

    fn unreachable_error(&self) -> ShellmindError {
        ShellmindError::ServiceUnreachable {
            url: self.endpoint().to_string(),
            details: "connection refused".to_string(),
        }
    }

    pub fn network_calls(&self) -> usize {
        self.ping_calls() + self.list_calls() + self.generate_calls()
    }
}

impl ModelService for StubService {
    fn endpoint(&self) -> &str {
        "stub://model-service"
    }

    fn ping(&self, _timeout: Duration) -> Result<()> {
        let call = self.pings.fetch_add(1, Ordering::SeqCst) + 1;
        if self.is_up(call) {
            Ok(())
        } else {
            Err(self.unreachable_error())
        }
    }

    fn list_models(&self, _timeout: Duration) -> Result<Vec<ModelInfo>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.reachable_from_call.is_none() {
            return Err(self.unreachable_error());
        }
        Ok(self
            .models
            .lock()
            .expect("models lock")
            .iter()
            .map(ModelInfo::named)
            .collect())
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.generates.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(request.prompt.clone());
        if self.reachable_from_call.is_none() {
            return Err(self.unreachable_error());
        }
        let reply = {
            let mut replies = self.replies.lock().expect("replies lock");
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        match reply {
            Some(StubReply::Text(text)) => Ok(text),
            Some(StubReply::Timeout) => Err(ShellmindError::Timeout(request.timeout)),
            Some(StubReply::Unreachable) => Err(self.unreachable_error()),
            None => Err(ShellmindError::InvalidResponse("no reply".to_string())),
        }
    }
}

pub struct StubLauncher {
    installed: bool,
    fails: bool,
    launches: AtomicUsize,
}

impl StubLauncher {
    pub fn installed() -> Self {
        Self {
            installed: true,
            fails: false,
            launches: AtomicUsize::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            installed: false,
            ..Self::installed()
        }
    }

    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Self::installed()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl ServiceLauncher for StubLauncher {
    fn binary_available(&self) -> bool {
        self.installed
    }

    fn launch(&self) -> Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            Err(ShellmindError::CommandFailed {
                command: "ollama serve".to_string(),
                details: "exit status 1".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
