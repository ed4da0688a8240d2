//! Shared state handed to every HTTP handler.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bootstrap::config::Config;
use crate::modules::crawler::Digester;
use crate::modules::gateway::GatewayClient;
use crate::modules::location::LocationMap;
use crate::modules::overlay::RatingService;
use crate::modules::store::ServiceStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ServiceStore>,
    pub digester: Arc<Digester>,
    pub gateway: Arc<GatewayClient>,
    pub ratings: Arc<RatingService>,
    pub locations: Arc<LocationMap>,
    /// The gateway node's own peer-id once resolved; used as the fallback
    /// when a request omits the id.
    pub self_id: Arc<RwLock<Option<String>>>,
    pub config: Arc<Config>,
}
