// src/cli/interactive.rs
use dialoguer::{theme::ColorfulTheme, Input};

use crate::error::{TaskScopeResult, TaskScopeError};

/// The person being greeted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub age: u32,
}

impl User {
    pub fn new(name: impl Into<String>, age: u32) -> TaskScopeResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(TaskScopeError::InvalidInput("name must not be empty".to_string()));
        }
        Ok(Self { name, age })
    }

    pub fn greeting(&self) -> String {
        format!("Welcome, {}!", self.name)
    }
}

/// Ask for the user's name on the terminal
pub fn prompt_name() -> TaskScopeResult<String> {
    Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter your name")
        .interact_text()
        .map_err(|e| TaskScopeError::InvalidInput(format!("Input error: {}", e)))
}
