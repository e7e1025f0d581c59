//! 步骤状态机
//!
//! 管理流水线单个步骤的状态转换

use rtedit_core::{Result, RtEditError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 步骤状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StepStatus {
    Pending,   // 等待
    Active,    // 执行中
    Completed, // 已完成
    Failed,    // 失败
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// 步骤状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StepEvent {
    Activate,
    Complete,
    Skip,
    Fail,
    Retry,
}

/// 步骤状态机
#[derive(Debug)]
pub struct StepStateMachine {
    transitions: HashMap<(StepStatus, StepEvent), StepStatus>,
}

impl StepStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((StepStatus::Pending, StepEvent::Activate), StepStatus::Active);
        transitions.insert((StepStatus::Pending, StepEvent::Skip), StepStatus::Completed);
        transitions.insert((StepStatus::Active, StepEvent::Complete), StepStatus::Completed);
        transitions.insert((StepStatus::Active, StepEvent::Fail), StepStatus::Failed);
        transitions.insert((StepStatus::Failed, StepEvent::Retry), StepStatus::Active);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: StepStatus, event: StepEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: StepStatus, event: StepEvent) -> Result<StepStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(RtEditError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current: StepStatus) -> Vec<StepEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for StepStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = StepStateMachine::new();

        assert!(sm.can_transition(StepStatus::Pending, StepEvent::Activate));
        assert!(sm.can_transition(StepStatus::Pending, StepEvent::Skip));
        assert!(sm.can_transition(StepStatus::Active, StepEvent::Complete));
        assert!(sm.can_transition(StepStatus::Active, StepEvent::Fail));
        assert!(sm.can_transition(StepStatus::Failed, StepEvent::Retry));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = StepStateMachine::new();

        assert!(!sm.can_transition(StepStatus::Completed, StepEvent::Activate));
        assert!(!sm.can_transition(StepStatus::Pending, StepEvent::Complete));
        assert!(!sm.can_transition(StepStatus::Failed, StepEvent::Complete));
        assert!(sm.get_possible_events(StepStatus::Completed).is_empty());
    }

    #[test]
    fn test_state_execution() {
        let sm = StepStateMachine::new();

        let result = sm.transition(StepStatus::Active, StepEvent::Fail);
        assert_eq!(result.unwrap(), StepStatus::Failed);

        let result = sm.transition(StepStatus::Completed, StepEvent::Fail);
        assert!(matches!(result, Err(RtEditError::InvalidStateTransition { .. })));
    }
}
