//! Shared application state.

use std::sync::{Arc, Mutex};

use taleforge_combat::application::coordinator::CombatCoordinator;
use taleforge_core::clock::Clock;
use taleforge_core::rng::DeterministicRng;
use taleforge_core::store::GameStore;
use taleforge_llm::dispatcher::Dispatcher;
use taleforge_narrative::application::extractor::EntityExtractor;
use taleforge_narrative::application::orchestrator::{NarrativeOrchestrator, OrchestratorDeps};
use taleforge_narrative::domain::extraction::ExtractionCache;
use taleforge_tools::application::executor::ToolExecutor;

use crate::hub::CombatHub;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Narrative turn loop.
    pub orchestrator: Arc<NarrativeOrchestrator>,
    /// Sole owner of encounter state.
    pub combat: Arc<CombatCoordinator>,
    /// Combat event fan-out.
    pub hub: Arc<CombatHub>,
}

impl AppState {
    /// Wires every service once; the RNG is shared by tools and combat.
    #[must_use]
    pub fn new(
        store: Arc<dyn GameStore>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    ) -> Self {
        let combat = Arc::new(CombatCoordinator::new(Arc::clone(&store), Arc::clone(&rng)));
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&store), rng, Arc::clone(&clock)));
        let extractor = EntityExtractor::new(
            Arc::clone(&dispatcher),
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::new(ExtractionCache::default()),
        );
        let orchestrator = Arc::new(NarrativeOrchestrator::new(OrchestratorDeps {
            store,
            dispatcher,
            executor,
            combat: Arc::clone(&combat),
            extractor,
            clock,
        }));

        Self {
            orchestrator,
            combat,
            hub: Arc::new(CombatHub::default()),
        }
    }
}
