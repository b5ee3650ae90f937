use crate::{
    config::Config,
    services::{ConversationService, DeliveryEngine, MessageService, UploadStore},
    store::Stores,
    websocket::PresenceRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub presence: PresenceRegistry,
    pub messages: MessageService,
    pub uploads: UploadStore,
}

impl AppState {
    /// Wires the services over the given backend with an empty presence registry
    pub fn new(config: Arc<Config>, stores: Stores) -> Self {
        let presence = PresenceRegistry::new();
        let delivery = DeliveryEngine::new(Arc::new(presence.clone()), stores.messages.clone());
        let messages = MessageService::new(
            ConversationService::new(stores.conversations.clone()),
            stores.messages.clone(),
            delivery,
        );
        let uploads = UploadStore::new(&config.uploads);

        Self {
            config,
            presence,
            messages,
            uploads,
        }
    }
}
