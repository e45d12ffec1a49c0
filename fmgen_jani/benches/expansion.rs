use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fmgen_core::*;
use fmgen_jani::*;

fn uniform() -> Expression {
    Expression::Distribution(Distribution::uniform(0.0, 1.0).unwrap())
}

#[inline(always)]
fn single_assignment_model() -> Model {
    let mut automaton = Automaton::new("sampler");
    automaton.add_location("idle");
    automaton.make_initial("idle").unwrap();
    automaton
        .add_variable(Variable::new("x", Type::Real, Some(0.0.into()), true))
        .unwrap();
    automaton
        .add_edge(Edge::new(
            "idle",
            Destination::new("idle").with_assignment(Assignment::new("x", uniform(), 0)),
        ))
        .unwrap();
    let mut model = Model::new("single");
    model.add_automaton(automaton).unwrap();
    model
}

#[inline(always)]
fn chained_assignments_model() -> Model {
    let mut automaton = Automaton::new("sampler");
    automaton.add_location("idle");
    automaton.make_initial("idle").unwrap();
    let mut dest = Destination::new("idle");
    for idx in 0..4 {
        let var = format!("x{idx}");
        automaton
            .add_variable(Variable::new(var.as_str(), Type::Real, Some(0.0.into()), true))
            .unwrap();
        dest = dest.with_assignment(Assignment::new(var, uniform(), idx));
    }
    automaton.add_edge(Edge::new("idle", dest)).unwrap();
    let mut model = Model::new("chained");
    model.add_automaton(automaton).unwrap();
    model
}

fn distributions(c: &mut Criterion) {
    let sum = Expression::binary(OpTag::Add, uniform(), uniform());
    for resolution in [10, 100] {
        c.bench_with_input(
            BenchmarkId::new("expand sum of distributions", resolution),
            &sum,
            |b, sum| {
                b.iter(|| expand_distributions(sum, resolution).unwrap().len());
            },
        );
    }
}

fn models(c: &mut Criterion) {
    let models = [
        (single_assignment_model(), "single assignment"),
        (chained_assignments_model(), "chained assignments"),
    ];
    for (model, name) in models.into_iter() {
        c.bench_with_input(
            BenchmarkId::new("expand random variables", name),
            &model,
            |b, model| {
                b.iter(|| {
                    let mut model = model.clone();
                    expand_random_variables(&mut model, 100).unwrap();
                    model
                });
            },
        );
    }
}

criterion_group!(benches, distributions, models);
criterion_main!(benches);
