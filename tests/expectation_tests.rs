//! Matcher behavior observed end to end through the runner: passing
//! predicates, negation duality, and the exact failure messages.

mod common;

use cordon::runner::{run_case, TestCase};
use cordon::value::{Anchor, Value};
use cordon::CaseOutcome;

use common::memory_host;

fn reason_of(outcome: CaseOutcome) -> String {
    match outcome {
        CaseOutcome::Failed(report) => report.reason,
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn equality_both_polarities() {
    let fixture = memory_host();

    let passing = TestCase::new("eq passes on equal values", |sb, _| {
        sb.expect(1 + 1).to().eq(2);
        sb.expect("a").to_not().eq("b");
    });
    assert_eq!(run_case(&fixture.harness, &passing).unwrap(), CaseOutcome::Passed);

    let failing = TestCase::new("eq fails on unequal values", |sb, _| {
        sb.expect(1).to().eq(2);
    });
    assert_eq!(
        reason_of(run_case(&fixture.harness, &failing).unwrap()),
        "Expected 1 to equal '2'"
    );

    let negated = TestCase::new("negated eq fails on equal values", |sb, _| {
        sb.expect(3).to_not().eq(3);
    });
    assert_eq!(
        reason_of(run_case(&fixture.harness, &negated).unwrap()),
        "Expected 3 to not equal '3'"
    );
}

#[test]
fn ordering_matchers() {
    let fixture = memory_host();

    let passing = TestCase::new("lt and gt pass", |sb, _| {
        sb.expect(1).to().lt(2);
        sb.expect(2).to().gt(1);
        sb.expect(2).to_not().lt(1);
    });
    assert_eq!(run_case(&fixture.harness, &passing).unwrap(), CaseOutcome::Passed);

    let failing = TestCase::new("gt fails", |sb, _| {
        sb.expect(1).to().gt(5);
    });
    assert_eq!(
        reason_of(run_case(&fixture.harness, &failing).unwrap()),
        "Expected 1 to be greater than '5'"
    );
}

#[test]
fn type_matchers_match_the_subjects_own_type() {
    let fixture = memory_host();

    let passing = TestCase::new("type matcher grid", |sb, _| {
        for subject in [
            Value::from(1),
            Value::from("s"),
            Value::from(true),
            Value::Nil,
        ] {
            let type_name = subject.type_name();
            sb.expect(subject).to().be_a(type_name);
        }
        sb.expect(1).to_not().be_a("String");
    });
    assert_eq!(run_case(&fixture.harness, &passing).unwrap(), CaseOutcome::Passed);

    let failing = TestCase::new("be_an fails with its own grammar", |sb, _| {
        sb.expect("text").to().be_an("Number");
    });
    assert_eq!(
        reason_of(run_case(&fixture.harness, &failing).unwrap()),
        "Expected text to be an Number"
    );
}

#[test]
fn presence_and_boolean_matchers() {
    let fixture = memory_host();

    let passing = TestCase::new("nil/exist/true/false", |sb, _| {
        sb.expect(Value::Nil).to().be_nil();
        sb.expect(Value::Nil).to_not().exist();
        sb.expect(0).to().exist();
        sb.expect(true).to().be_true();
        sb.expect(false).to().be_false();
        sb.expect(1).to_not().be_true();
    });
    assert_eq!(run_case(&fixture.harness, &passing).unwrap(), CaseOutcome::Passed);

    let failing = TestCase::new("exist fails on nil", |sb, _| {
        sb.expect(Value::Nil).to().exist();
    });
    assert_eq!(
        reason_of(run_case(&fixture.harness, &failing).unwrap()),
        "Expected nil to exist"
    );
}

#[test]
fn reference_liveness_matchers() {
    let fixture = memory_host();

    let case = TestCase::new("live and dead references", |sb, _| {
        let anchor = Anchor::new(Value::from(42));
        let live = anchor.reference();
        sb.expect(live.clone()).to().be_alive();
        sb.expect(live.clone()).to_not().be_dead();
        drop(anchor);
        sb.expect(live.clone()).to().be_dead();
        sb.expect(live).to_not().be_alive();
    });
    assert_eq!(run_case(&fixture.harness, &case).unwrap(), CaseOutcome::Passed);
}

#[test]
fn call_matchers_convert_raises_into_verdicts() {
    let fixture = memory_host();

    let case = TestCase::new("call matcher grid", |sb, _| {
        let ok = Value::func(|_| Value::from(1));
        let bad = Value::func(|_| cordon::trace::raise("callable exploded"));
        sb.expect(ok.clone()).to().succeed_when_called();
        sb.expect(ok).to_not().fail_when_called();
        sb.expect(bad.clone()).to().fail_when_called();
        sb.expect(bad.clone()).to().fail_with("callable exploded");
        sb.expect(bad).to_not().fail_with("some other message");
        // A non-callable subject fails when called rather than crashing
        // the matcher.
        sb.expect(Value::Nil).to().fail_when_called();
    });
    assert_eq!(run_case(&fixture.harness, &case).unwrap(), CaseOutcome::Passed);

    let failing = TestCase::new("succeed_when_called fails", |sb, _| {
        let bad = Value::func(|_| cordon::trace::raise("nope"));
        sb.expect(bad).to().succeed_when_called();
    });
    assert_eq!(
        reason_of(run_case(&fixture.harness, &failing).unwrap()),
        "Expected function to succeed when called"
    );
}
