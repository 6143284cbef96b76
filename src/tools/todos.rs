//! The agent's todo list.

use crate::approval::collaborators::TaskList;
use crate::approval::types::{Todo, TodoStatus, ToolArgs};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct TodoBoard {
    todos: RwLock<Vec<Todo>>,
}

impl TodoBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<Todo> {
        self.todos.read().await.clone()
    }

    pub async fn replace(&self, todos: Vec<Todo>) {
        *self.todos.write().await = todos;
    }

    /// `write_todos`: replace the whole list.
    pub async fn write_todos(&self, args: &ToolArgs) -> Result<String> {
        let value = args.get("todos").cloned().context("missing 'todos'")?;
        let todos: Vec<Todo> = serde_json::from_value(value).context("'todos' is not a todo list")?;
        let done = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        let total = todos.len();
        self.replace(todos).await;
        Ok(format!("Updated todo list ({}/{} completed)", done, total))
    }
}

#[async_trait]
impl TaskList for TodoBoard {
    async fn task_list(&self) -> Vec<Todo> {
        self.snapshot().await
    }
}
