//! Tools the agent can call, and the executor that dispatches them.

pub mod dataroom;
pub mod todos;
pub mod workspace;

use crate::approval::types::ToolArgs;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub use dataroom::DataRoom;
pub use todos::TodoBoard;
pub use workspace::Workspace;

/// Runs a tool that has already passed the gate.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, args: &ToolArgs) -> Result<String>;
}

/// The data-room toolset: documents, the file workspace and the todo board.
#[derive(Clone)]
pub struct DataRoomTools {
    pub room: Arc<DataRoom>,
    pub workspace: Arc<Workspace>,
    pub todos: Arc<TodoBoard>,
}

impl DataRoomTools {
    pub fn new(room: DataRoom) -> Self {
        Self {
            room: Arc::new(room),
            workspace: Arc::new(Workspace::new()),
            todos: Arc::new(TodoBoard::new()),
        }
    }
}

#[async_trait]
impl ToolExecutor for DataRoomTools {
    async fn execute(&self, tool_name: &str, args: &ToolArgs) -> Result<String> {
        match tool_name {
            "list_data_room_documents" => Ok(self.room.list_documents()),
            "get_documents" => self.room.get_documents(args),
            "get_page_text" => self.room.get_page_text(args),
            "get_page_image" => bail!("Page images are not available from an in-memory data room"),
            "analyze_documents" => self.room.analyze_documents(args),
            "read_file" => self.workspace.read_file(args).await,
            "write_file" => self.workspace.write_file(args).await,
            "edit_file" => self.workspace.edit_file(args).await,
            "write_todos" => self.todos.write_todos(args).await,
            other => bail!("Tool '{}' is not available in this runtime", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let tools = DataRoomTools::new(DataRoom::default());
        let err = tools.execute("web_search", &ToolArgs::new()).await.unwrap_err();
        assert!(err.to_string().contains("not available"));
    }

    #[tokio::test]
    async fn test_dispatch_to_workspace() {
        let tools = DataRoomTools::new(DataRoom::default());
        let serde_json::Value::Object(args) =
            serde_json::json!({"file_path": "memo.md", "content": "draft"})
        else {
            unreachable!()
        };
        tools.execute("write_file", &args).await.unwrap();
        assert_eq!(tools.workspace.contents("memo.md").await.as_deref(), Some("draft"));
    }
}
