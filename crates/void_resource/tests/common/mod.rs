//! Test handlers shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use void_resource::prelude::*;

/// Loads `value` from the file's text after `stages` pending polls
pub struct ValueLoader {
    pub name: String,
    pub extensions: Vec<String>,
    pub type_name: String,
    pub stages: usize,
    pub polls: Arc<AtomicUsize>,
}

impl ValueLoader {
    pub fn new(extension: &str, type_name: &str) -> Self {
        Self {
            name: format!("{}-loader", type_name),
            extensions: vec![extension.to_string()],
            type_name: type_name.to_string(),
            stages: 0,
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_stages(mut self, stages: usize) -> Self {
        self.stages = stages;
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

struct ValueLoad {
    type_name: String,
    stages: usize,
    stage: usize,
    polls: Arc<AtomicUsize>,
}

impl InteractiveLoad for ValueLoad {
    fn poll(&mut self, ctx: &mut LoadContext<'_>) -> ResourceResult<LoadStep> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.stage < self.stages {
            self.stage += 1;
            return Ok(LoadStep::Pending);
        }
        let text = ctx.read_string()?;
        let resource = Resource::new(self.type_name.clone());
        let text = text.trim();
        match text.parse::<i64>() {
            Ok(value) => resource.set_silent("value", value),
            Err(_) => resource.set_silent("value", text),
        }
        Ok(LoadStep::Ready(resource))
    }

    fn stage(&self) -> usize {
        self.stage
    }

    fn stage_count(&self) -> usize {
        self.stages.max(1)
    }
}

impl FormatLoader for ValueLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognized_extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn handles_type(&self, type_name: &str) -> bool {
        type_name == self.type_name
    }

    fn resource_type(&self, _fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
        let ext = path.extension()?;
        self.extensions.contains(&ext).then(|| self.type_name.clone())
    }

    fn load_interactive(
        &self,
        _path: &ResourcePath,
        _original_path: &ResourcePath,
        _type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>> {
        Ok(Box::new(ValueLoad {
            type_name: self.type_name.clone(),
            stages: self.stages,
            stage: 0,
            polls: self.polls.clone(),
        }))
    }
}

/// Writes the `value` property as text
pub struct ValueSaver {
    pub extension: String,
}

impl FormatSaver for ValueSaver {
    fn name(&self) -> &str {
        "value-saver"
    }

    fn recognize(&self, resource: &Resource) -> bool {
        resource.has("value")
    }

    fn recognized_extensions(&self, _resource: &Resource) -> Vec<String> {
        vec![self.extension.clone()]
    }

    fn save(&self, fs: &dyn FileSystem, path: &ResourcePath, resource: &Resource, _flags: SaveFlags) -> ResourceResult<()> {
        let text = match resource.get("value") {
            Some(Variant::Int(value)) => value.to_string(),
            Some(Variant::String(value)) => value,
            _ => return Err(ResourceError::Invalid("value must be an int or a string".into())),
        };
        fs.write_all(path, text.as_bytes())
    }
}

pub fn memory_subsystem() -> (Arc<MemoryFileSystem>, ResourceSubsystem) {
    let fs = Arc::new(MemoryFileSystem::new());
    let subsystem = ResourceSubsystem::new(fs.clone());
    (fs, subsystem)
}
