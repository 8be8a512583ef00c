use std::time::Duration;

use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    chrono::Utc,
};
use kube::{Api, Client};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::patcher::{Operation, Patcher};
use crate::common::{ACCEPTED_CONDITION_REASON, ACCEPTED_CONDITION_TYPE, CONDITION_STATUS_TRUE};

pub struct GatewayClassPatcher {
    client: Client,
    request_timeout: Duration,
    shutdown: CancellationToken,
    receiver: mpsc::Receiver<Operation<GatewayClass>>,
}

impl Patcher<GatewayClass> for GatewayClassPatcher {
    fn receiver(&mut self) -> &mut mpsc::Receiver<Operation<GatewayClass>> {
        &mut self.receiver
    }

    fn api(&self, _namespace: &str) -> Api<GatewayClass> {
        Api::all(self.client.clone())
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn status(&self, current: &GatewayClass, controller_name: &str) -> serde_json::Value {
        let mut conditions: Vec<Condition> = current.status.as_ref().and_then(|status| status.conditions.clone()).unwrap_or_default();
        conditions.retain(|condition| condition.type_ != ACCEPTED_CONDITION_TYPE);
        conditions.push(accepted_condition(current.metadata.generation, controller_name));
        json!({ "conditions": conditions })
    }
}

impl GatewayClassPatcher {
    pub fn new(client: Client, request_timeout: Duration, shutdown: CancellationToken) -> (Self, mpsc::Sender<Operation<GatewayClass>>) {
        let (sender, receiver) = mpsc::channel(1024);
        (
            Self {
                client,
                request_timeout,
                shutdown,
                receiver,
            },
            sender,
        )
    }
}

fn accepted_condition(observed_generation: Option<i64>, controller_name: &str) -> Condition {
    Condition {
        last_transition_time: Time(Utc::now()),
        message: format!("GatewayClass is accepted by controller {controller_name}"),
        observed_generation,
        reason: ACCEPTED_CONDITION_REASON.to_owned(),
        status: CONDITION_STATUS_TRUE.to_owned(),
        type_: ACCEPTED_CONDITION_TYPE.to_owned(),
    }
}
