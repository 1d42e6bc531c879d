//! Interactive (staged) loading
//!
//! An [`InteractiveLoader`] drives a handler's [`InteractiveLoad`] one stage
//! per [`InteractiveLoader::poll`]. It holds the loading-map slot for its
//! path until the load completes or fails; dropping it early cancels the
//! load and publishes nothing for the target path.
//!
//! A loader may be handed to another thread between polls; the slot follows
//! whichever thread polls it.

use crate::cache::CacheMode;
use crate::error::{ResourceError, ResourceResult};
use crate::loader::{InteractiveLoad, LoadContext, LoadStep};
use crate::loading_map::LoadingGuard;
use crate::path::ResourcePath;
use crate::resource::Resource;
use crate::subsystem::ResourceSubsystem;

/// Result of one poll
#[derive(Debug, Clone)]
pub enum LoadPoll {
    /// Stage `stage` of `total` finished; more remain
    InProgress { stage: usize, total: usize },
    /// The load is complete
    Done(Resource),
    /// The load failed
    Failed(ResourceError),
}

impl LoadPoll {
    /// Check if the load is still running
    pub fn is_in_progress(&self) -> bool {
        matches!(self, LoadPoll::InProgress { .. })
    }
}

enum State {
    Running {
        body: Box<dyn InteractiveLoad>,
        guard: LoadingGuard,
    },
    Done(Resource),
    Failed(ResourceError),
}

/// A pollable, one-shot load
pub struct InteractiveLoader {
    subsystem: ResourceSubsystem,
    path: ResourcePath,
    original_path: ResourcePath,
    type_hint: Option<String>,
    cache_mode: CacheMode,
    translation_remapped: bool,
    state: State,
}

impl InteractiveLoader {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn running(
        subsystem: ResourceSubsystem,
        path: ResourcePath,
        original_path: ResourcePath,
        type_hint: Option<String>,
        cache_mode: CacheMode,
        translation_remapped: bool,
        body: Box<dyn InteractiveLoad>,
        guard: LoadingGuard,
    ) -> Self {
        Self {
            subsystem,
            path,
            original_path,
            type_hint,
            cache_mode,
            translation_remapped,
            state: State::Running { body, guard },
        }
    }

    /// A loader that is already complete (cache hit)
    pub(crate) fn finished(subsystem: ResourceSubsystem, path: ResourcePath, resource: Resource) -> Self {
        Self {
            subsystem,
            original_path: path.clone(),
            path,
            type_hint: None,
            cache_mode: CacheMode::Reuse,
            translation_remapped: false,
            state: State::Done(resource),
        }
    }

    /// Canonical path being loaded
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Current stage
    pub fn stage(&self) -> usize {
        match &self.state {
            State::Running { body, .. } => body.stage(),
            State::Done(_) | State::Failed(_) => self.stage_count(),
        }
    }

    /// Total stages known so far
    pub fn stage_count(&self) -> usize {
        match &self.state {
            State::Running { body, .. } => body.stage_count(),
            State::Done(_) | State::Failed(_) => 1,
        }
    }

    /// The loaded resource; only available after `Done`
    pub fn resource(&self) -> Option<Resource> {
        match &self.state {
            State::Done(resource) => Some(resource.clone()),
            _ => None,
        }
    }

    /// Advance the load by one stage
    pub fn poll(&mut self) -> LoadPoll {
        let step = match &mut self.state {
            State::Done(resource) => return LoadPoll::Done(resource.clone()),
            State::Failed(err) => return LoadPoll::Failed(err.clone()),
            State::Running { body, guard } => {
                guard.rebind();
                let stage = body.stage();
                let mut ctx = LoadContext::new(
                    &self.subsystem,
                    &self.path,
                    &self.original_path,
                    self.type_hint.as_deref(),
                    self.cache_mode,
                );
                match body.poll(&mut ctx) {
                    Ok(LoadStep::Pending) => {
                        return LoadPoll::InProgress {
                            stage,
                            total: body.stage_count(),
                        }
                    }
                    Ok(LoadStep::Ready(resource)) => Ok(resource),
                    Err(err) => Err(err),
                }
            }
        };

        // Replacing the state releases the loading-map slot
        match step.and_then(|resource| self.complete(resource)) {
            Ok(resource) => {
                self.state = State::Done(resource.clone());
                self.subsystem.observers().resource_loaded(&resource, resource.uid());
                LoadPoll::Done(resource)
            }
            Err(err) => {
                self.state = State::Failed(err.clone());
                self.subsystem.observers().load_error(&err);
                LoadPoll::Failed(err)
            }
        }
    }

    /// Poll until done
    pub fn wait(mut self) -> ResourceResult<Resource> {
        loop {
            match self.poll() {
                LoadPoll::InProgress { .. } => {}
                LoadPoll::Done(resource) => return Ok(resource),
                LoadPoll::Failed(err) => return Err(err),
            }
        }
    }

    /// Publish and tag the finished resource
    fn complete(&self, resource: Resource) -> ResourceResult<Resource> {
        let cache = self.subsystem.cache();
        let resource = match self.cache_mode {
            CacheMode::Ignore => resource,
            CacheMode::Replace => {
                resource.set_path(cache, self.path.clone(), true)?;
                resource
            }
            CacheMode::Reuse => match resource.set_path(cache, self.path.clone(), false) {
                Ok(()) => resource,
                Err(ResourceError::PathConflict(_)) => match cache.lookup(&self.path) {
                    Some(existing) => {
                        log::warn!("{} was published while loading; keeping the cached instance", self.path);
                        existing
                    }
                    None => {
                        resource.set_path(cache, self.path.clone(), false)?;
                        resource
                    }
                },
                Err(err) => return Err(err),
            },
        };

        if self.translation_remapped {
            cache.track_remapped(&resource, &self.original_path);
        }
        if self.subsystem.config().timestamp_on_load {
            resource.set_last_modified(self.subsystem.fs().modified_time(&self.path).ok());
        }
        log::debug!("Loaded {} as {}", self.path, resource.class());
        Ok(resource)
    }
}

impl std::fmt::Debug for InteractiveLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Running { .. } => "running",
            State::Done(_) => "done",
            State::Failed(_) => "failed",
        };
        f.debug_struct("InteractiveLoader")
            .field("path", &self.path)
            .field("state", &state)
            .finish()
    }
}
