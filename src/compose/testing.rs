//! Scripted CommandExecutor used by unit and integration tests

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

use super::executor::{CommandExecutor, CommandOutput, Invocation};

/// Records every invocation and answers according to simple word rules
///
/// A rule applies when the program or one of the arguments equals its word.
#[derive(Default)]
pub struct ScriptedExecutor {
    invocations: Mutex<Vec<Invocation>>,
    failing: Vec<String>,
    unstartable: Vec<String>,
    panicking: Vec<String>,
    stdout: HashMap<String, String>,
    barriers: HashMap<String, Arc<Barrier>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `word` exit with code 1
    pub fn failing(mut self, word: &str) -> Self {
        self.failing.push(word.to_string());
        self
    }

    /// Commands containing `word` cannot be started
    pub fn unstartable(mut self, word: &str) -> Self {
        self.unstartable.push(word.to_string());
        self
    }

    /// Commands containing `word` panic inside the executor
    pub fn panicking(mut self, word: &str) -> Self {
        self.panicking.push(word.to_string());
        self
    }

    pub fn with_stdout(mut self, word: &str, stdout: &str) -> Self {
        self.stdout.insert(word.to_string(), stdout.to_string());
        self
    }

    /// Commands containing `word` wait until `parties` of them are running
    pub fn rendezvous(mut self, word: &str, parties: usize) -> Self {
        self.barriers
            .insert(word.to_string(), Arc::new(Barrier::new(parties)));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn matches(invocation: &Invocation, word: &str) -> bool {
        invocation.program == word || invocation.args.iter().any(|arg| arg == word)
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());

        if self
            .unstartable
            .iter()
            .any(|word| Self::matches(invocation, word))
        {
            return Err(anyhow!("No such file or directory (os error 2)"));
        }

        if let Some(word) = self
            .panicking
            .iter()
            .find(|word| Self::matches(invocation, word))
        {
            panic!("scripted panic on '{}'", word);
        }

        let barrier = self
            .barriers
            .iter()
            .find(|(word, _)| Self::matches(invocation, word))
            .map(|(_, barrier)| Arc::clone(barrier));
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        let failed = self
            .failing
            .iter()
            .any(|word| Self::matches(invocation, word));
        let stdout = self
            .stdout
            .iter()
            .find(|(word, _)| Self::matches(invocation, word))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(CommandOutput {
            exit_code: Some(if failed { 1 } else { 0 }),
            stdout,
            stderr: if failed {
                "command failed\n".to_string()
            } else {
                String::new()
            },
            duration: Duration::from_millis(1),
            timed_out: false,
        })
    }
}
