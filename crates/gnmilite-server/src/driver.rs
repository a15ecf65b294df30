//! RPC-facing adapter mapping Capabilities, Get, Set and Subscribe onto the
//! engine.

use std::sync::Arc;

use gnmilite_core::protocol::{
    CapabilityRequest, CapabilityResponse, Encoding, GetRequest, GetResponse, ListMode, ModelData,
    SetRequest, SetResponse, SubscribeRequest, GNMI_VERSION,
};
use gnmilite_core::tree::Device;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::subscribe::{handle_subscribe_list, Subscription, SubscriptionManager, SubscriptionSink};

pub struct Driver {
    device: Arc<dyn Device>,
    subs: SubscriptionManager,
}

impl Driver {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            subs: SubscriptionManager::new(),
        }
    }

    pub fn capabilities(&self, _req: &CapabilityRequest) -> CapabilityResponse {
        let supported_models = self
            .device
            .modules()
            .into_iter()
            .map(|m| ModelData {
                name: m.name,
                organization: m.organization,
                version: m.revision,
            })
            .collect();
        CapabilityResponse {
            supported_models,
            supported_encodings: vec![Encoding::Json, Encoding::JsonIetf],
            gnmi_version: GNMI_VERSION.to_string(),
        }
    }

    pub fn get(&self, req: &GetRequest) -> Result<GetResponse> {
        crate::get::get(self.device.as_ref(), req)
    }

    pub fn set(&self, req: &SetRequest) -> Result<SetResponse> {
        crate::set::set(self.device.as_ref(), req)
    }

    /// Serve one Subscribe stream. Each `subscribe` message starts a
    /// subscription list; each `poll` message re-executes the stream's POLL
    /// subscriptions in creation order. Requests already queued are handled
    /// even after `cancel` fires. When the request side ends, emission
    /// continues until `cancel` fires. Every task started by the stream is
    /// stopped when this returns, including on error.
    pub async fn subscribe(
        &self,
        mut requests: mpsc::Receiver<SubscribeRequest>,
        sink: Arc<dyn SubscriptionSink>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let stream = cancel.child_token();
        let _guard = stream.clone().drop_guard();
        let mut polled: Vec<Arc<Subscription>> = Vec::new();

        loop {
            // queued requests are handled before cancellation is observed
            let req = tokio::select! {
                biased;
                req = requests.recv() => req,
                _ = stream.cancelled() => return Ok(()),
            };
            match req {
                Some(SubscribeRequest::Subscribe(list)) => {
                    let created =
                        handle_subscribe_list(&self.device, &self.subs, &stream, &list, Arc::clone(&sink))?;
                    if list.mode == ListMode::Poll {
                        polled.extend(created);
                    }
                }
                Some(SubscribeRequest::Poll {}) => {
                    tracing::debug!(count = polled.len(), "poll");
                    for sub in &polled {
                        sub.execute()?;
                    }
                }
                None => {
                    stream.cancelled().await;
                    return Ok(());
                }
            }
        }
    }

    /// Recurring subscriptions still ticking, across all streams.
    pub fn active_subscriptions(&self) -> usize {
        self.subs.active_count()
    }
}
