//! 单飞令牌
//!
//! 保证同一操作在任意时刻最多只有一个执行实例。

use rtedit_core::{Result, RtEditError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 单飞守卫
#[derive(Debug, Clone)]
pub struct SingleFlight {
    operation: &'static str,
    busy: Arc<AtomicBool>,
}

/// 持有期间操作处于进行中，释放时自动归还
#[derive(Debug)]
pub struct FlightPermit {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 获取执行许可，已有执行实例时返回 `Busy`
    pub fn acquire(&self) -> Result<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RtEditError::Busy(self.operation))?;
        Ok(FlightPermit {
            busy: self.busy.clone(),
        })
    }

    pub fn in_flight(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
