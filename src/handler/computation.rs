//! The user computation run on resolved geometry.

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::geometry::FeatureSet;

/// A geoprocessing function.
///
/// Errors become `Failed` tasks; their debug rendering (cause chain and any
/// captured backtrace) is stored as the task's error text.
#[async_trait]
pub trait Computation: Send + Sync {
    /// Runs the computation on `features`.
    async fn run(&self, features: FeatureSet) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`Computation`].
///
/// The closure may return any serializable result.
///
/// # Examples
///
/// ```
/// use geoprocessing::handler::FnComputation;
/// use geoprocessing::geometry::FeatureSet;
///
/// let computation = FnComputation::new(|features: FeatureSet| async move {
///     anyhow::Ok(features.len())
/// });
/// # let _ = computation;
/// ```
pub struct FnComputation<F> {
    func: F,
}

impl<F> FnComputation<F> {
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> std::fmt::Debug for FnComputation<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnComputation").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, T> Computation for FnComputation<F>
where
    F: Fn(FeatureSet) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Serialize + 'static,
{
    async fn run(&self, features: FeatureSet) -> anyhow::Result<Value> {
        let output = (self.func)(features).await?;
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point() -> FeatureSet {
        FeatureSet::from_geojson(json!({ "type": "Point", "coordinates": [1, 2] })).unwrap()
    }

    #[tokio::test]
    async fn closure_result_is_serialized() {
        let computation = FnComputation::new(|features: FeatureSet| async move {
            anyhow::Ok(json!({ "count": features.len() }))
        });
        let value = computation.run(point()).await.unwrap();
        assert_eq!(value, json!({ "count": 1 }));
    }

    #[tokio::test]
    async fn closure_error_propagates() {
        let computation = FnComputation::new(|_features: FeatureSet| async move {
            Err::<(), _>(anyhow::anyhow!("raster missing"))
        });
        let err = computation.run(point()).await.unwrap_err();
        assert_eq!(err.to_string(), "raster missing");
    }
}
