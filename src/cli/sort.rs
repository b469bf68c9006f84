//! Sort command implementation

use anyhow::Result;

use vltpkg::config::Config;
use vltpkg::registry::RegisteredPackage;
use vltpkg::resolver;

pub fn run(packages: &[String], config: &Config) -> Result<()> {
    let registry = config.open_registry()?;

    let ids = if packages.is_empty() {
        registry.packages()?.into_iter().collect()
    } else {
        packages
            .iter()
            .map(|p| super::registered_id(registry.as_ref(), p))
            .collect::<Result<Vec<_>>>()?
    };

    let mut items = Vec::new();
    for id in &ids {
        if let Some(pkg) = registry.open(id)? {
            items.push(pkg);
        }
    }

    for pkg in resolver::sort::<RegisteredPackage>(items)? {
        println!("{}", pkg.id());
    }
    Ok(())
}
