//! Builds position resolvers from stage configuration.
use crate::core::PositionResolver;
use crate::error::{CaloError, CaloResult};
use crate::geometry::{GeometryProvider, Readout};
use crate::positions::{BarrelResolver, DiscResolver, TailCatcherResolver};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use toml::Value;

/// Resolver section of a stage definition.
///
/// ```toml
/// [stages.resolver]
/// kind = "discs"
/// readout = "EMECPhiEta"
/// merged_layers = [2, 2, 4, 4]
/// ```
///
/// Everything besides `kind` and `readout` is handed to the factory registered for
/// `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub kind: String,
    pub readout: String,
    #[serde(flatten)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BarrelParams {
    #[serde(default)]
    layer_radii: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DiscParams {
    #[serde(default)]
    merged_layers: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForwardParams {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TailCatcherParams {
    central_radius: f64,
}

type ResolverFactory =
    Box<dyn Fn(&Readout, &Value) -> CaloResult<Arc<dyn PositionResolver>> + Send + Sync>;

pub struct ResolverRegistry {
    factories: HashMap<String, ResolverFactory>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverRegistry {
    /// Creates a registry with the built-in shapes: `barrel`, `discs`, `forward` and
    /// `tail_catcher`.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };

        registry.register("barrel", |readout, params| {
            let params: BarrelParams = parse_params("barrel", params)?;
            Ok(Arc::new(BarrelResolver::new(readout, params.layer_radii)?))
        });

        // Without merged_layers a disc readout is resolved like a forward one.
        registry.register("discs", |readout, params| {
            let params: DiscParams = parse_params("discs", params)?;
            let resolver = match params.merged_layers {
                Some(merged) => DiscResolver::merged(readout, &merged)?,
                None => DiscResolver::forward(readout)?,
            };
            Ok(Arc::new(resolver))
        });

        registry.register("forward", |readout, params| {
            let _: ForwardParams = parse_params("forward", params)?;
            Ok(Arc::new(DiscResolver::forward(readout)?))
        });

        registry.register("tail_catcher", |readout, params| {
            let params: TailCatcherParams = parse_params("tail_catcher", params)?;
            Ok(Arc::new(TailCatcherResolver::new(readout, params.central_radius)?))
        });

        registry
    }

    /// Registers a custom resolver factory, replacing any factory of the same kind.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&Readout, &Value) -> CaloResult<Arc<dyn PositionResolver>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    /// Looks up the readout in `geometry` and builds the resolver `config` asks for.
    ///
    /// # Errors
    ///
    /// `CaloError::Configuration` for an unknown kind, an unknown readout, parameters
    /// the kind does not accept, or geometry the shape cannot use.
    pub fn create(
        &self,
        config: &ResolverConfig,
        geometry: &dyn GeometryProvider,
    ) -> CaloResult<Arc<dyn PositionResolver>> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            CaloError::Configuration(format!(
                "unknown resolver kind '{}'. Available kinds: [{}]",
                config.kind,
                self.list_kinds().join(", ")
            ))
        })?;
        let readout = geometry.readout(&config.readout)?;
        factory(readout.as_ref(), &config.params)
    }

    pub fn list_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn is_available(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(kind: &str, params: &Value) -> CaloResult<T> {
    let params = match params {
        Value::Table(_) => params.clone(),
        _ => Value::Table(toml::map::Map::new()),
    };
    params
        .try_into()
        .map_err(|e| CaloError::Configuration(format!("invalid '{}' resolver parameters: {}", kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DetectorGeometry;
    use crate::positions::test_support::{barrel_readout, disc_readout};

    fn geometry() -> DetectorGeometry {
        let mut geometry = DetectorGeometry::new();
        geometry.add(barrel_readout(None)).unwrap();
        geometry.add(disc_readout()).unwrap();
        geometry
    }

    fn config(kind: &str, readout: &str, params: &str) -> ResolverConfig {
        ResolverConfig {
            kind: kind.into(),
            readout: readout.into(),
            params: toml::from_str(params).unwrap(),
        }
    }

    #[test]
    fn builds_every_builtin_kind() {
        let registry = ResolverRegistry::new();
        let geometry = geometry();

        let barrel = registry
            .create(
                &config("barrel", "ECalBarrelPhiEta", "layer_radii = [193.0, 198.5]"),
                &geometry,
            )
            .unwrap();
        assert_eq!(barrel.shape(), "barrel");

        let endcap = registry
            .create(&config("discs", "EMECPhiEta", "merged_layers = [2, 2, 4]"), &geometry)
            .unwrap();
        assert_eq!(endcap.shape(), "endcap");

        let fwd = registry
            .create(&config("discs", "EMECPhiEta", ""), &geometry)
            .unwrap();
        assert_eq!(fwd.shape(), "forward");

        let fwd = registry
            .create(&config("forward", "EMECPhiEta", ""), &geometry)
            .unwrap();
        assert_eq!(fwd.readout_name(), "EMECPhiEta");
    }

    #[test]
    fn rejects_unknown_kind_readout_and_params() {
        let registry = ResolverRegistry::new();
        let geometry = geometry();

        let err = registry
            .create(&config("cone", "EMECPhiEta", ""), &geometry)
            .err()
            .unwrap();
        assert!(err.to_string().contains("cone"));

        assert!(registry
            .create(&config("forward", "HFwdPhiEta", ""), &geometry)
            .is_err());
        assert!(registry
            .create(&config("forward", "EMECPhiEta", "merged_layers = [2]"), &geometry)
            .is_err());
        assert!(registry
            .create(&config("discs", "EMECPhiEta", "merged_layers = [0, 2, 4]"), &geometry)
            .is_err());
        assert!(registry
            .create(&config("tail_catcher", "ECalBarrelPhiEta", ""), &geometry)
            .is_err());
    }

    #[test]
    fn lists_kinds_sorted() {
        let registry = ResolverRegistry::new();
        assert_eq!(
            registry.list_kinds(),
            vec!["barrel", "discs", "forward", "tail_catcher"]
        );
        assert!(registry.is_available("barrel"));
    }
}
