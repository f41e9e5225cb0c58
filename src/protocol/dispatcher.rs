use crate::core::container::ValueMap;
use crate::error::{constants, BitswarmError, DispatchError, Result};
use crate::protocol::controllers::{extension_controller, system_controller};
use crate::protocol::event::Event;
use crate::protocol::message::{ActionId, Envelope, Target};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn = dyn Fn(&ValueMap) -> Result<Vec<Event>> + Send + Sync + 'static;

/// Action table for one routing target.
///
/// Handlers are plain closures: a new action is a `register` call, never a new type.
pub struct Controller {
    target: Target,
    handlers: RwLock<HashMap<ActionId, Arc<HandlerFn>>>,
}

impl Controller {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Register (or replace) the handler for an action
    pub fn register<F>(&self, action: ActionId, handler: F) -> Result<()>
    where
        F: Fn(&ValueMap) -> Result<Vec<Event>> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_DISPATCHER_WRITE_LOCK))?;

        handlers.insert(action, Arc::new(handler));
        Ok(())
    }

    /// Builder form of [`register`](Self::register) for static tables
    pub fn with<F>(self, action: ActionId, handler: F) -> Result<Self>
    where
        F: Fn(&ValueMap) -> Result<Vec<Event>> + Send + Sync + 'static,
    {
        self.register(action, handler)?;
        Ok(self)
    }

    pub fn handles(&self, action: ActionId) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(&action))
            .unwrap_or(false)
    }

    pub fn handle(&self, action: ActionId, payload: &ValueMap) -> Result<Vec<Event>> {
        let handler = self
            .handlers
            .read()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_DISPATCHER_READ_LOCK))?
            .get(&action)
            .cloned()
            .ok_or(DispatchError::UnknownAction {
                target: self.target.id(),
                action,
            })?;
        // Table lock is released here, so handlers may register more handlers
        handler(payload)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let actions = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("Controller")
            .field("target", &self.target)
            .field("actions", &actions)
            .finish()
    }
}

/// Routes envelopes to the controller registered for their target.
#[derive(Clone)]
pub struct Dispatcher {
    controllers: Arc<RwLock<HashMap<Target, Arc<Controller>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// An empty dispatcher; every envelope is an unknown target until controllers are added
    pub fn new() -> Self {
        Self {
            controllers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Dispatcher pre-loaded with the built-in System and Extension controllers
    pub fn with_defaults() -> Result<Self> {
        let dispatcher = Self::new();
        dispatcher.register_controller(system_controller()?)?;
        dispatcher.register_controller(extension_controller()?)?;
        Ok(dispatcher)
    }

    /// Install a controller, replacing any previous one for the same target
    pub fn register_controller(&self, controller: Controller) -> Result<()> {
        let mut controllers = self
            .controllers
            .write()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_DISPATCHER_WRITE_LOCK))?;

        controllers.insert(controller.target(), Arc::new(controller));
        Ok(())
    }

    pub fn controller(&self, target: Target) -> Result<Option<Arc<Controller>>> {
        let controllers = self
            .controllers
            .read()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_DISPATCHER_READ_LOCK))?;
        Ok(controllers.get(&target).cloned())
    }

    /// Add one handler to an existing controller, creating the controller if needed
    pub fn register<F>(&self, target: Target, action: ActionId, handler: F) -> Result<()>
    where
        F: Fn(&ValueMap) -> Result<Vec<Event>> + Send + Sync + 'static,
    {
        if let Some(controller) = self.controller(target)? {
            return controller.register(action, handler);
        }
        self.register_controller(Controller::new(target).with(action, handler)?)
    }

    /// Route one envelope.
    ///
    /// # Errors
    /// `DispatchError::UnknownTarget` / `UnknownAction` when nothing handles the envelope,
    /// or whatever the handler itself reports
    pub fn dispatch(&self, envelope: &Envelope) -> Result<Vec<Event>> {
        // The map lock is released before the handler runs
        let controller = self
            .controller(envelope.target)?
            .ok_or(DispatchError::UnknownTarget(envelope.target.id()))?;

        controller.handle(envelope.action, &envelope.payload)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets: Vec<Target> = self
            .controllers
            .read()
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("Dispatcher")
            .field("targets", &targets)
            .finish()
    }
}
