//! Plugin chain.
//!
//! Runs the registered plugins' lifecycle hooks in registration order. A
//! request that enters the render pipeline is tracked by an [`InFlight`]
//! guard: `before_send` runs exactly once, either when the response is
//! finished or when the guard is dropped because the request was cancelled.

use prerender_metrics::{
    Next, Plugin, PrerenderRequest, PrerenderResponse, RenderResult, ServerHandle,
};
use std::mem;
use std::sync::Arc;
use tracing::{debug, info};

/// Ordered list of plugins.
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin. Hooks run in the order plugins are added.
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn init(&self, server: &ServerHandle) {
        for plugin in &self.plugins {
            plugin.init(server);
        }
        info!(
            target: "prerender.service.pipeline",
            plugins = ?self.names(),
            "Plugin chain initialized"
        );
    }

    /// Offer the request to each plugin until one handles it.
    pub fn process_request(&self, req: &PrerenderRequest, res: &mut PrerenderResponse) -> bool {
        for plugin in &self.plugins {
            if plugin.process_request(req, res) {
                debug!(
                    target: "prerender.service.pipeline",
                    plugin = plugin.name(),
                    "Request handled by plugin"
                );
                return true;
            }
        }
        false
    }

    pub fn request_received(&self, req: &mut PrerenderRequest, res: &mut PrerenderResponse) {
        for plugin in &self.plugins {
            let _proceed = plugin.request_received(req, res, Next::new());
        }
    }

    pub fn before_send(&self, req: &mut PrerenderRequest, res: &mut PrerenderResponse) {
        for plugin in &self.plugins {
            let _proceed = plugin.before_send(req, res, Next::new());
        }
    }

    /// Run `request_received` and start tracking the request.
    pub fn begin(self: &Arc<Self>, mut req: PrerenderRequest) -> InFlight {
        let mut res = PrerenderResponse::new();
        self.request_received(&mut req, &mut res);
        InFlight {
            chain: Arc::clone(self),
            req,
            res,
            finished: false,
        }
    }
}

/// A request between `request_received` and `before_send`.
pub struct InFlight {
    chain: Arc<PluginChain>,
    req: PrerenderRequest,
    res: PrerenderResponse,
    finished: bool,
}

impl InFlight {
    pub fn request(&self) -> &PrerenderRequest {
        &self.req
    }

    /// Attach the render outcome for `before_send` to record.
    pub fn attach(&mut self, result: RenderResult) {
        self.req.prerender = Some(result);
    }

    /// Run `before_send` over `res` and return the response to send.
    pub fn finish(mut self, res: PrerenderResponse) -> PrerenderResponse {
        self.res = res;
        self.chain.before_send(&mut self.req, &mut self.res);
        self.finished = true;
        mem::take(&mut self.res)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                target: "prerender.service.pipeline",
                target_uri = %self.req.uri,
                "Request dropped before response, running before_send"
            );
            self.chain.before_send(&mut self.req, &mut self.res);
        }
    }
}
