//! Simulated gateway for dev mode and tests.
//!
//! Issues fake codes and reports them paid once a configurable timer has
//! elapsed, so the full pending -> claimable -> claimed flow can run without
//! a real aggregator account.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{CodeCreated, GatewayStatus, PaymentGateway};

pub struct SimulatedGateway {
    /// gateway_ref -> unix second at which the code counts as paid
    pay_at: Mutex<HashMap<String, i64>>,
    auto_pay_after_secs: i64,
}

impl SimulatedGateway {
    pub fn new(auto_pay_after_secs: i64) -> Self {
        Self {
            pay_at: Mutex::new(HashMap::new()),
            auto_pay_after_secs,
        }
    }

    /// Force a code paid immediately, regardless of the timer.
    pub fn mark_paid(&self, gateway_ref: &str) {
        let mut pay_at = self.pay_at.lock().expect("simulated gateway lock poisoned");
        pay_at.insert(gateway_ref.to_string(), Utc::now().timestamp());
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_code(&self, amount: i64, _duration_minutes: i64) -> Result<CodeCreated> {
        let gateway_ref = format!("sim-{}", Uuid::new_v4());
        let mut pay_at = self.pay_at.lock().expect("simulated gateway lock poisoned");
        pay_at.insert(
            gateway_ref.clone(),
            Utc::now().timestamp() + self.auto_pay_after_secs,
        );
        Ok(CodeCreated {
            code_payload: format!("00020101SIM{}", gateway_ref),
            gateway_ref,
            total_amount: amount,
        })
    }

    async fn check_status(&self, gateway_ref: &str) -> Result<GatewayStatus> {
        let pay_at = self.pay_at.lock().expect("simulated gateway lock poisoned");
        match pay_at.get(gateway_ref) {
            Some(at) if Utc::now().timestamp() >= *at => Ok(GatewayStatus::Paid),
            Some(_) => Ok(GatewayStatus::Unpaid),
            None => Err(AppError::Gateway(format!(
                "unknown simulated code: {}",
                gateway_ref
            ))),
        }
    }

    async fn cancel(&self, gateway_ref: &str) -> Result<()> {
        let mut pay_at = self.pay_at.lock().expect("simulated gateway lock poisoned");
        pay_at.remove(gateway_ref);
        Ok(())
    }
}
