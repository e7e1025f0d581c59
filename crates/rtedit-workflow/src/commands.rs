//! ROI操作分发表
//!
//! 展示层按动作名称调用ROI操作，动作映射为会话事件。

use rtedit_core::{Result, RtEditError};
use std::collections::HashMap;

use crate::session::{reduce, SessionEvent, SessionState};

type RoiAction = fn(usize) -> SessionEvent;

/// 动作名 -> 事件构造器
#[derive(Debug, Clone)]
pub struct CommandTable {
    actions: HashMap<&'static str, RoiAction>,
}

impl CommandTable {
    pub fn new() -> Self {
        let mut actions: HashMap<&'static str, RoiAction> = HashMap::new();
        actions.insert("edit", SessionEvent::RoiEditRequested);
        actions.insert("toggle", SessionEvent::RoiVisibilityToggled);
        Self { actions }
    }

    pub fn register(&mut self, name: &'static str, action: RoiAction) {
        self.actions.insert(name, action);
    }

    pub fn actions(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.actions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// 将动作解析为事件
    pub fn resolve(&self, name: &str, roi_index: usize) -> Result<SessionEvent> {
        self.actions
            .get(name)
            .map(|action| action(roi_index))
            .ok_or_else(|| RtEditError::NotFound(format!("ROI action `{}`", name)))
    }

    /// 解析并应用到会话状态
    pub fn dispatch(&self, state: &SessionState, name: &str, roi_index: usize) -> Result<SessionState> {
        let event = self.resolve(name, roi_index)?;
        reduce(state, event)
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}
