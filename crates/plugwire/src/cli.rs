use std::error::Error;
use std::path::Path;

use log::info;
use plugwire_core::{
    ComponentRequirement, PluginDescriptor, RequirementConfig, Requirements, StaticModuleLoader, System,
    VersionSpec,
};

use crate::{CliArgs, Commands};

pub type CliResult<T> = Result<T, Box<dyn Error>>;

/// Execute the parsed command, writing its report to stdout.
pub fn run(args: &CliArgs) -> CliResult<()> {
    match &args.command {
        Commands::Scan { dir } => {
            let system = open_system(args, dir)?;
            for descriptor in system.found_plugins() {
                let path = descriptor.path().map(|p| p.display().to_string()).unwrap_or_default();
                println!("{}  {}  {}", descriptor.version_string(), descriptor.author(), path);
            }
            Ok(())
        }
        Commands::Providers {
            dir,
            component,
            subtypes,
            all_versions,
        } => {
            let system = open_system(args, dir)?;
            let providers = system.iter_component_providers(component, *subtypes, *all_versions, &VersionSpec::Any);
            if providers.is_empty() {
                info!("No providers of '{}'", component);
            }
            for provider in providers {
                println!("{}  {}:{}", provider.component, provider.plugin, provider.version);
            }
            Ok(())
        }
        Commands::Resolve {
            dir,
            component,
            require,
        } => {
            let system = open_system(args, dir)?;
            let resolution = match require {
                Some(requirement) => system.resolve(component, &ComponentRequirement::parse(requirement)?)?,
                None => system.resolve_default(component)?,
            };
            println!("{}", resolution);
            Ok(())
        }
        Commands::Check { dir } => {
            let system = open_system(args, dir)?;
            let graph = system.dependency_graph(&Requirements::new());
            if !graph.is_satisfied() {
                for unresolved in graph.unresolved() {
                    println!(
                        "{} consumes '{}' ({}): {}",
                        unresolved.plugin, unresolved.component, unresolved.requirement, unresolved.reason
                    );
                }
                return Err(format!("{} unresolved requirement(s)", graph.unresolved().len()).into());
            }
            for (position, key) in graph.load_order()?.iter().enumerate() {
                println!("{:>3}. {}", position + 1, key);
            }
            Ok(())
        }
    }
}

/// Discover and register every plugin under `dir`. No module is loaded and no
/// enable hook runs.
fn open_system(args: &CliArgs, dir: &Path) -> CliResult<System> {
    let mut system = System::new(StaticModuleLoader::new()).enable_yaml(args.yaml);
    if let Some(path) = &args.config {
        let config = RequirementConfig::load(path)?;
        system = system.with_config(&config)?;
    }

    let found = system.search(dir)?;
    let batch: Vec<PluginDescriptor> = system.found_plugins().cloned().collect();
    system.register_plugins(batch)?;
    info!("Registered {} plugin(s) from {}", found, dir.display());
    Ok(system)
}
