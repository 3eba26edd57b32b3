use crate::proxy::engine::ProxyEngine;
use std::ops::Deref;
use std::sync::Arc;

/// 代理路由的共享状态
///
/// 持有代理引擎以及推断客户端协议所需的配置。
#[derive(Clone)]
pub struct ProxyState {
    engine: Arc<ProxyEngine>,
    public_scheme: Arc<str>,
}

impl ProxyState {
    #[must_use]
    pub fn new(engine: Arc<ProxyEngine>, public_scheme: &str) -> Self {
        Self {
            engine,
            public_scheme: Arc::from(public_scheme),
        }
    }

    #[must_use]
    pub fn public_scheme(&self) -> &str {
        &self.public_scheme
    }
}

impl Deref for ProxyState {
    type Target = ProxyEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}
