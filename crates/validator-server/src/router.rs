//! Validator Server Router: dispatches authenticated requests to services.

use std::future::Future;
use std::pin::Pin;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use validator_protocol::{ApiError, HandlerResult, SLOT_DOES_NOT_EXIST, parse_slot};
use validator_services::Service;
use validator_transport::{Method, RequestHandler};

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// The Validator Server. Owns services and routes requests.
pub struct ValidatorServer {
    /// Registered services (boxed for object safety)
    services: Vec<Box<dyn ServiceDyn>>,
    state: RwLock<ServerState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Uninitialized,
    Running,
    Shutdown,
}

/// Object-safe wrapper for the Service trait.
trait ServiceDyn: Send + Sync {
    fn namespace_dyn(&self) -> &str;
    fn handle_dyn(&self, slot: u64) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>>;
    fn init_dyn(&self) -> Pin<Box<dyn Future<Output = InitResult> + Send + '_>>;
    fn shutdown_dyn(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<T: Service> ServiceDyn for T {
    fn namespace_dyn(&self) -> &str {
        self.namespace()
    }
    fn handle_dyn(&self, slot: u64) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>> {
        Box::pin(self.handle(slot))
    }
    fn init_dyn(&self) -> Pin<Box<dyn Future<Output = InitResult> + Send + '_>> {
        Box::pin(self.init())
    }
    fn shutdown_dyn(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }
}

impl ValidatorServer {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            state: RwLock::new(ServerState::Uninitialized),
        }
    }

    /// Register a service with the server.
    pub fn register_service<S: Service + 'static>(&mut self, service: S) {
        info!("Registering service: {}", service.namespace());
        self.services.push(Box::new(service));
    }

    /// Namespaces of all registered services, in registration order.
    pub fn namespaces(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.namespace_dyn()).collect()
    }

    /// Initialize all services.
    pub async fn initialize(&self) -> InitResult {
        for service in &self.services {
            service.init_dyn().await?;
        }

        *self.state.write() = ServerState::Running;
        info!("Validator server initialized ({} services)", self.services.len());
        Ok(())
    }

    /// Shutdown all services.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == ServerState::Shutdown {
                return;
            }
            *state = ServerState::Shutdown;
        }

        info!("Shutting down validator server...");
        for service in &self.services {
            service.shutdown_dyn().await;
        }
        info!("Validator server shutdown complete");
    }

    /// Route a request to the appropriate service.
    ///
    /// Paths have the form `/{namespace}/{slot}`. The route is matched first,
    /// then the method, then the slot.
    async fn route_request(&self, method: &Method, path: &str) -> HandlerResult {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let Some((namespace, raw_slot)) = trimmed.split_once('/') else {
            return Err(ApiError::invalid_route());
        };
        if raw_slot.contains('/') {
            return Err(ApiError::invalid_route());
        }

        let Some(service) = self.services.iter().find(|s| s.namespace_dyn() == namespace) else {
            return Err(ApiError::invalid_route());
        };

        if method != Method::GET {
            return Err(ApiError::method_not_allowed());
        }

        let slot = parse_slot(raw_slot).map_err(|e| {
            debug!("{e}");
            ApiError::not_found(SLOT_DOES_NOT_EXIST)
        })?;

        service.handle_dyn(slot).await
    }
}

impl Default for ValidatorServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for ValidatorServer {
    async fn handle_request(&self, method: &Method, path: &str) -> HandlerResult {
        let state = *self.state.read();
        match state {
            ServerState::Shutdown => return Err(ApiError::shutting_down()),
            ServerState::Uninitialized => {
                warn!("request received before services were initialized");
                return Err(ApiError::internal());
            }
            ServerState::Running => {}
        }

        self.route_request(method, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use validator_protocol::ErrorCode;

    struct Echo {
        namespace: &'static str,
        stopped: Arc<AtomicBool>,
    }

    impl Service for Echo {
        fn namespace(&self) -> &str {
            self.namespace
        }

        async fn handle(&self, slot: u64) -> HandlerResult {
            Ok(json!({ "service": self.namespace, "slot": slot }))
        }

        async fn shutdown(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    async fn server() -> (ValidatorServer, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut server = ValidatorServer::new();
        server.register_service(Echo { namespace: "blockreward", stopped: stopped.clone() });
        server.register_service(Echo { namespace: "syncduties", stopped: stopped.clone() });
        server.initialize().await.unwrap();
        (server, stopped)
    }

    fn code(result: HandlerResult) -> Option<ErrorCode> {
        result.unwrap_err().error_code()
    }

    #[tokio::test]
    async fn routes_by_namespace() {
        let (server, _) = server().await;
        assert_eq!(server.namespaces(), vec!["blockreward", "syncduties"]);

        let body = server.handle_request(&Method::GET, "/blockreward/123").await.unwrap();
        assert_eq!(body, json!({ "service": "blockreward", "slot": 123 }));

        let body = server.handle_request(&Method::GET, "/syncduties/0").await.unwrap();
        assert_eq!(body["service"], "syncduties");
    }

    #[tokio::test]
    async fn unknown_paths_are_invalid_routes() {
        let (server, _) = server().await;
        for path in ["/", "/blockreward", "/nope/1", "/blockreward/1/extra", "/BLOCKREWARD/1"] {
            assert_eq!(
                code(server.handle_request(&Method::GET, path).await),
                Some(ErrorCode::InvalidRoute),
                "{path}"
            );
        }
    }

    #[tokio::test]
    async fn non_get_is_method_not_allowed() {
        let (server, _) = server().await;
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            assert_eq!(
                code(server.handle_request(&method, "/blockreward/1").await),
                Some(ErrorCode::MethodNotAllowed)
            );
        }
    }

    #[tokio::test]
    async fn bad_slot_is_not_found() {
        let (server, _) = server().await;
        for path in ["/blockreward/-1", "/blockreward/abc", "/blockreward/", "/syncduties/1.5"] {
            let err = server.handle_request(&Method::GET, path).await.unwrap_err();
            assert_eq!(err.status, 404, "{path}");
            assert_eq!(err.params, Some(json!("slot does not exist")));
        }
    }

    #[tokio::test]
    async fn refuses_before_initialize_and_after_shutdown() {
        let mut server = ValidatorServer::new();
        server.register_service(Echo { namespace: "blockreward", stopped: Arc::default() });
        assert_eq!(
            code(server.handle_request(&Method::GET, "/blockreward/1").await),
            Some(ErrorCode::InternalServerError)
        );

        server.initialize().await.unwrap();
        server.shutdown().await;
        assert_eq!(
            code(server.handle_request(&Method::GET, "/blockreward/1").await),
            Some(ErrorCode::ServerShuttingDown)
        );
    }

    #[tokio::test]
    async fn shutdown_reaches_services_once() {
        let (server, stopped) = server().await;
        server.shutdown().await;
        assert!(stopped.load(Ordering::SeqCst));

        stopped.store(false, Ordering::SeqCst);
        server.shutdown().await;
        assert!(!stopped.load(Ordering::SeqCst));
    }
}
