mod common;

use anyhow::Result;
use common::dev_harness;
use std::sync::{Arc, Mutex};
use tracing::{span, Subscriber};
use tracing_subscriber::{layer::Context, prelude::*, Layer};
use zkcalc_host::{Operation, OperationRequest};

/// Records each span's name and the lowest `profiling_{i}` level it declares.
#[derive(Clone, Default)]
struct ProfiledSpans(Arc<Mutex<Vec<(&'static str, usize)>>>);

impl<S: Subscriber> Layer<S> for ProfiledSpans {
    fn on_new_span(&self, attrs: &span::Attributes<'_>, _id: &span::Id, _ctx: Context<'_, S>) {
        let metadata = attrs.metadata();
        if let Some(level) =
            (1..=3).find(|i| metadata.fields().field(&format!("profiling_{i}")).is_some())
        {
            self.0.lock().unwrap().push((metadata.name(), level));
        }
    }
}

#[tokio::test]
async fn test_request_spans_carry_profiling_levels() -> Result<()> {
    let spans = ProfiledSpans::default();
    let _guard = tracing_subscriber::registry()
        .with(spans.clone())
        .set_default();

    let h = dev_harness();
    let response = h
        .calc
        .execute(OperationRequest::new(Operation::Add { a: 1.0, b: 2.0 }))
        .await?;
    h.calc
        .verify_artifact(&response.zk_proof.proof_file_path, None)
        .await?;

    let recorded = spans.0.lock().unwrap().clone();
    for expected in [
        ("execute", 1),
        ("verify_artifact", 1),
        ("generate", 2),
        ("persist_artifact", 2),
        ("dev_prove", 3),
    ] {
        assert!(recorded.contains(&expected), "{expected:?} in {recorded:?}");
    }
    Ok(())
}
