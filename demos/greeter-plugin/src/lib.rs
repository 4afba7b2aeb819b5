//! Demo plugin for the `demo` module.
//!
//! Build with `cargo build -p greeter-plugin`, copy the resulting library
//! into a directory and run `qmx plugins --module demo --dir <directory>`.

use qmx_plugin_sdk::prelude::*;

/// Greets on every lifecycle transition.
#[derive(Debug, Default)]
pub struct Greeter {
    greetings: u32,
}

impl Greeter {
    fn greet(&mut self, stage: &str) {
        self.greetings += 1;
        eprintln!("greeter: {} (#{})", stage, self.greetings);
    }
}

impl Plugin for Greeter {
    fn id(&self) -> &str {
        "greeter"
    }

    fn version(&self) -> Version {
        Version::new(0, 6, 0)
    }

    fn meta(&self) -> PluginMeta {
        let mut meta = PluginMeta::new();
        meta.insert("description".to_string(), "Says hello".to_string());
        meta.insert("greetings".to_string(), self.greetings.to_string());
        meta
    }

    fn install(&mut self) -> PluginResult<()> {
        self.greet("installed");
        Ok(())
    }

    fn initialize(&mut self) -> PluginResult<()> {
        self.greet("hello");
        Ok(())
    }

    fn shutdown(&mut self) -> PluginResult<()> {
        self.greet("goodbye");
        Ok(())
    }
}

export_plugin!(module: "demo", plugin: Greeter::default());
