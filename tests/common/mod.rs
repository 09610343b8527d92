#![allow(dead_code)]

pub use judgedag_test_utils::builders::{BlueprintBuilder, TestEngine};
pub use judgedag_test_utils::fake_actuator::FakeActuator;
pub use judgedag_test_utils::{init_tracing, with_timeout};

use judgedag::model::{Args, BlueprintId, Judgement};

/// Create a judgement for `blueprint_id`, start it and wait for its verdict.
pub async fn judge(engine: &TestEngine, blueprint_id: BlueprintId, args: Args) -> Judgement {
    let mut rx = engine.dispatcher.subscribe();
    let created = engine
        .repos
        .judgements
        .create(blueprint_id, args)
        .expect("create judgement");
    engine
        .dispatcher
        .submit(created.id)
        .await
        .expect("submit judgement");
    with_timeout(TestEngine::finished(&mut rx, created.id)).await
}
