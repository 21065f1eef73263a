//! Stdin chat loop — the local conversational surface.
//!
//! A plain line is an image prompt; `/tasks` lists recent tasks; `/quit`
//! exits. Agent-side notifications arrive through the notifier subscription
//! and are printed as they happen.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::notify::{AgentEvent, Notifier};
use crate::store::Database;
use crate::task::LifecycleManager;

pub struct ChatLoop {
    manager: Arc<LifecycleManager>,
    store: Arc<dyn Database>,
    notifier: Arc<Notifier>,
}

impl ChatLoop {
    pub fn new(
        manager: Arc<LifecycleManager>,
        store: Arc<dyn Database>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            manager,
            store,
            notifier,
        }
    }

    /// Run until EOF or `/quit`.
    pub async fn run(self) {
        // Print agent events as they arrive.
        let mut events = self.notifier.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    AgentEvent::TaskCompleted { task, degraded } => {
                        if let Some(url) = &task.result_url {
                            if degraded {
                                println!("\n✅ Image ready (copy not saved): {url}");
                            } else {
                                println!("\n✅ Image ready: {url}");
                            }
                        }
                        eprint!("> ");
                    }
                    AgentEvent::TaskFailed { id } => {
                        println!("\n❌ Generation failed (task {id})");
                        eprint!("> ");
                    }
                    AgentEvent::TaskRetrying { .. } => {
                        eprintln!("⏳ Still working — retrying status check");
                    }
                    _ => {}
                }
            }
        });

        let stdin = tokio::io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        eprint!("> ");
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        eprint!("> ");
                        continue;
                    }
                    match line {
                        "/quit" => break,
                        "/tasks" => self.print_tasks().await,
                        prompt => self.start_generation(prompt).await,
                    }
                    eprint!("> ");
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    }

    async fn start_generation(&self, prompt: &str) {
        if let Err(e) = self.store.append_chat_message("user", prompt).await {
            warn!(error = %e, "Failed to record user prompt");
        }
        match self.manager.start(prompt).await {
            Ok(task) => {
                println!("🎨 Working on it (task {})", task.id);
            }
            Err(e) => {
                println!("⚠️  {e}");
            }
        }
    }

    async fn print_tasks(&self) {
        let mut tasks = self.store.list_tasks().await.unwrap_or_default();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if tasks.is_empty() {
            println!("No tasks yet.");
            return;
        }
        for task in tasks.iter().take(20) {
            let result = task.result_url.as_deref().unwrap_or("-");
            println!("{}  {:9}  {}  {}", task.id, task.state, task.prompt, result);
        }
    }
}
