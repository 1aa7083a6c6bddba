//! Indicator encoding.
//!
//! Each indicator owns an integer value variable asserted equal to its
//! expression. Built-in templates expand against the task, claim and
//! buffer variables; optional tasks are masked by their scheduled flag
//! throughout, so unscheduled sentinels never leak into a metric.

use crate::error::EncodeError;
use crate::models::{Function, Indicator, IndicatorExpr};
use crate::smt::Term;

use super::context::EncoderCtx;
use super::exprs::lower_int_expr;

/// Declares all indicator variables, then asserts their definitions.
///
/// Declaration happens up front so free-form expressions may reference
/// indicators attached later.
pub fn encode_indicators(ctx: &mut EncoderCtx<'_>) -> Result<(), EncodeError> {
    let problem = ctx.problem;
    for indicator in problem.indicators() {
        let uid = problem
            .uid_of("indicator", &indicator.name)
            .expect("attached indicator is registered");
        let var = ctx.declare_int(format!("Indicator_{}_{uid}", indicator.name));
        ctx.indicator_vars.insert(indicator.name.clone(), var);
    }
    for indicator in problem.indicators() {
        emit_definition(ctx, indicator)?;
    }
    Ok(())
}

fn emit_definition(ctx: &mut EncoderCtx<'_>, indicator: &Indicator) -> Result<(), EncodeError> {
    let label = format!("indicator:{}", indicator.name);
    let value = Term::int_var(&ctx.indicator_vars[&indicator.name]);
    let mut assertions: Vec<Term> = Vec::new();

    match &indicator.expr {
        IndicatorExpr::Expression(expr) => {
            let term = lower_int_expr(ctx, &indicator.name, expr)?;
            assertions.push(value.clone().eq(term));
        }
        IndicatorExpr::Makespan => {
            assertions.extend(max_over(
                &value,
                ctx.problem
                    .tasks()
                    .iter()
                    .map(|t| {
                        let tv = &ctx.task_vars[&t.name];
                        (tv.scheduled_term(), tv.end_term())
                    })
                    .collect(),
            ));
        }
        IndicatorExpr::Flowtime => {
            let total = Term::sum(
                ctx.problem
                    .tasks()
                    .iter()
                    .map(|t| {
                        let tv = &ctx.task_vars[&t.name];
                        Term::ite(tv.scheduled_term(), tv.end_term(), Term::Int(0))
                    })
                    .collect(),
            );
            assertions.push(value.clone().eq(total));
        }
        IndicatorExpr::FlowtimeSingleResource { resource, interval } => {
            ctx.resource(&indicator.name, resource)?;
            let total = Term::sum(
                ctx.claims_on(resource)
                    .iter()
                    .map(|c| {
                        let mut counted = vec![c.assigned_term()];
                        if let Some(window) = interval {
                            counted.push(c.start_term().ge(Term::Int(window.start)));
                            counted.push(c.end_term().le(Term::Int(window.end)));
                        }
                        Term::ite(Term::and(counted), c.end_term(), Term::Int(0))
                    })
                    .collect(),
            );
            assertions.push(value.clone().eq(total));
        }
        IndicatorExpr::Tardiness => {
            assertions.push(value.clone().eq(lateness_sum(ctx, true)));
        }
        IndicatorExpr::Earliness => {
            assertions.push(value.clone().eq(lateness_sum(ctx, false)));
        }
        IndicatorExpr::MaximumLateness => {
            assertions.extend(max_over(
                &value,
                ctx.problem
                    .tasks()
                    .iter()
                    .filter_map(|t| {
                        let due = t.due_date?;
                        let tv = &ctx.task_vars[&t.name];
                        Some((
                            tv.scheduled_term(),
                            tv.end_term().minus(Term::Int(due)),
                        ))
                    })
                    .collect(),
            ));
        }
        IndicatorExpr::NumberOfTardyTasks => {
            let total = Term::sum(
                ctx.problem
                    .tasks()
                    .iter()
                    .filter_map(|t| {
                        let due = t.due_date?;
                        let tv = &ctx.task_vars[&t.name];
                        Some(Term::ite(
                            Term::and(vec![
                                tv.scheduled_term(),
                                tv.end_term().gt(Term::Int(due)),
                            ]),
                            Term::Int(1),
                            Term::Int(0),
                        ))
                    })
                    .collect(),
            );
            assertions.push(value.clone().eq(total));
        }
        IndicatorExpr::ResourceUtilization { resource } => {
            ctx.resource(&indicator.name, resource)?;
            let busy = Term::sum(
                ctx.claims_on(resource)
                    .iter()
                    .map(|c| c.end_term().minus(c.start_term()))
                    .collect(),
            );
            assertions.push(value.clone().eq(Term::Div(
                Box::new(Term::Int(100).times(busy)),
                Box::new(ctx.horizon_term()),
            )));
        }
        IndicatorExpr::NumberTasksAssigned { resource } => {
            ctx.resource(&indicator.name, resource)?;
            let total = Term::sum(
                ctx.claims_on(resource)
                    .iter()
                    .map(|c| Term::ite(c.assigned_term(), Term::Int(1), Term::Int(0)))
                    .collect(),
            );
            assertions.push(value.clone().eq(total));
        }
        IndicatorExpr::ResourceCost { resources } => {
            let mut contributions = Vec::new();
            for resource in resources {
                let model = ctx.resource(&indicator.name, resource)?;
                let Some(cost) = &model.cost else { continue };
                for claim in ctx.claims_on(resource) {
                    contributions.push(Term::ite(
                        claim.assigned_term(),
                        integral_term(cost, claim.start_term(), claim.end_term()),
                        Term::Int(0),
                    ));
                }
            }
            assertions.push(value.clone().eq(Term::sum(contributions)));
        }
        IndicatorExpr::PriorityWeightedEnds => {
            let total = Term::sum(
                ctx.problem
                    .tasks()
                    .iter()
                    .map(|t| {
                        let tv = &ctx.task_vars[&t.name];
                        Term::ite(
                            tv.scheduled_term(),
                            Term::Int(t.priority).times(tv.end_term()),
                            Term::Int(0),
                        )
                    })
                    .collect(),
            );
            assertions.push(value.clone().eq(total));
        }
        IndicatorExpr::SmallestStartTime | IndicatorExpr::LargestStartTime => {
            let maximum = matches!(indicator.expr, IndicatorExpr::LargestStartTime);
            assertions.extend(extreme_over(
                &value,
                ctx.problem
                    .tasks()
                    .iter()
                    .map(|t| {
                        let tv = &ctx.task_vars[&t.name];
                        (tv.scheduled_term(), tv.start_term())
                    })
                    .collect(),
                maximum,
            ));
        }
        IndicatorExpr::MaxBufferLevel { buffer } => {
            assertions.extend(buffer_extreme(ctx, &indicator.name, buffer, &value, true)?);
        }
        IndicatorExpr::MinBufferLevel { buffer } => {
            assertions.extend(buffer_extreme(ctx, &indicator.name, buffer, &value, false)?);
        }
    }

    if let Some((lb, ub)) = indicator.bounds {
        assertions.push(value.clone().ge(Term::Int(lb)));
        assertions.push(value.clone().le(Term::Int(ub)));
    }
    for term in assertions {
        ctx.assert(label.as_str(), term);
    }
    Ok(())
}

/// `value = max over (guard, term) candidates`, 0 when none is active.
fn max_over(value: &Term, candidates: Vec<(Term, Term)>) -> Vec<Term> {
    extreme_over(value, candidates, true)
}

/// `value = max/min over (guard, term) candidates`, 0 when none is
/// active: a bound per active candidate plus an equality witness.
fn extreme_over(value: &Term, candidates: Vec<(Term, Term)>, maximum: bool) -> Vec<Term> {
    if candidates.is_empty() {
        return vec![value.clone().eq(Term::Int(0))];
    }
    let mut out = Vec::new();
    let mut witnesses = Vec::new();
    let mut none_active = Vec::new();
    for (guard, term) in candidates {
        let bound = if maximum {
            value.clone().ge(term.clone())
        } else {
            value.clone().le(term.clone())
        };
        out.push(guard.clone().implies(bound));
        witnesses.push(Term::and(vec![guard.clone(), value.clone().eq(term)]));
        none_active.push(Term::Not(Box::new(guard)));
    }
    witnesses.push(Term::and(vec![
        Term::and(none_active),
        value.clone().eq(Term::Int(0)),
    ]));
    out.push(Term::or(witnesses));
    out
}

/// Total tardiness (`positive = true`) or earliness (`false`).
fn lateness_sum(ctx: &EncoderCtx<'_>, positive: bool) -> Term {
    Term::sum(
        ctx.problem
            .tasks()
            .iter()
            .filter_map(|t| {
                let due = t.due_date?;
                let tv = &ctx.task_vars[&t.name];
                let (test, amount) = if positive {
                    (
                        tv.end_term().gt(Term::Int(due)),
                        tv.end_term().minus(Term::Int(due)),
                    )
                } else {
                    (
                        tv.end_term().lt(Term::Int(due)),
                        Term::Int(due).minus(tv.end_term()),
                    )
                };
                Some(Term::ite(
                    Term::and(vec![tv.scheduled_term(), test]),
                    amount,
                    Term::Int(0),
                ))
            })
            .collect(),
    )
}

fn buffer_extreme(
    ctx: &EncoderCtx<'_>,
    referrer: &str,
    buffer: &str,
    value: &Term,
    maximum: bool,
) -> Result<Vec<Term>, EncodeError> {
    let initial = ctx
        .buffer_initial
        .get(buffer)
        .cloned()
        .ok_or_else(|| EncodeError::UnknownReference {
            referrer: referrer.to_string(),
            kind: "buffer",
            name: buffer.to_string(),
        })?;
    let events = ctx.buffer_events.get(buffer).cloned().unwrap_or_default();
    let bound = |v: Term, candidate: Term| {
        if maximum {
            v.ge(candidate)
        } else {
            v.le(candidate)
        }
    };
    let mut out = vec![bound(value.clone(), initial.clone())];
    let mut witnesses = vec![value.clone().eq(initial)];
    for event in &events {
        let scheduled = ctx.task_vars[&event.task].scheduled_term();
        let level = Term::int_var(&event.level_var);
        out.push(
            scheduled
                .clone()
                .implies(bound(value.clone(), level.clone())),
        );
        witnesses.push(Term::and(vec![scheduled, value.clone().eq(level)]));
    }
    out.push(Term::or(witnesses));
    Ok(out)
}

/// Definite integral of a cost function over a variable window, as a term.
///
/// Linear uses the exact product form with one floor division at the
/// end; polynomial antiderivatives have integer coefficients by
/// construction.
fn integral_term(function: &Function, a: Term, b: Term) -> Term {
    let width = b.clone().minus(a.clone());
    match function {
        Function::Constant { value } => Term::Int(*value).times(width),
        Function::Linear { slope, intercept } => {
            let square_diff = b.clone().plus(a.clone()).times(b.minus(a));
            Term::Div(
                Box::new(Term::Int(*slope).times(square_diff)),
                Box::new(Term::Int(2)),
            )
            .plus(Term::Int(*intercept).times(width))
        }
        Function::Polynomial { coefficients } => {
            let g = Function::antiderivative_coefficients(coefficients);
            poly_eval(&g, b).minus(poly_eval(&g, a))
        }
    }
}

/// Horner evaluation of a polynomial with constant coefficients at a
/// term-valued point.
fn poly_eval(coefficients: &[i64], x: Term) -> Term {
    let mut acc = Term::Int(0);
    for &c in coefficients.iter().rev() {
        acc = acc.times(x.clone()).plus(Term::Int(c));
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::buffers::encode_buffers;
    use crate::encoder::constraints::encode_constraints;
    use crate::encoder::resources::encode_resources;
    use crate::encoder::tasks::encode_tasks;
    use crate::models::{Constraint, Problem, Resource, Task};
    use crate::smt::{BuiltinBackend, CheckOutcome, Model, SmtBackend};

    fn solve(problem: &Problem) -> (CheckOutcome, Option<Model>, EncoderCtx<'_>) {
        let mut ctx = EncoderCtx::new(problem);
        ctx.declare_int("horizon");
        ctx.assert("horizon", ctx.horizon_term().ge(Term::Int(0)));
        ctx.assert(
            "horizon",
            ctx.horizon_term().le(Term::Int(problem.horizon_ceiling())),
        );
        if let Some(h) = problem.fixed_horizon() {
            ctx.assert("horizon", ctx.horizon_term().eq(Term::Int(h)));
        }
        encode_tasks(&mut ctx);
        encode_resources(&mut ctx).unwrap();
        encode_buffers(&mut ctx).unwrap();
        encode_constraints(&mut ctx).unwrap();
        encode_indicators(&mut ctx).unwrap();
        let mut backend = BuiltinBackend::new();
        for (name, sort) in &ctx.declarations {
            backend.declare(name, *sort).unwrap();
        }
        for a in &ctx.assertions {
            backend.assert(a.term.clone()).unwrap();
        }
        let outcome = backend.check(&[]).unwrap();
        let model = (outcome == CheckOutcome::Sat).then(|| backend.model().unwrap());
        (outcome, model, ctx)
    }

    fn indicator_value(m: &Model, ctx: &EncoderCtx<'_>, name: &str) -> i64 {
        m.int(&ctx.indicator_vars[name])
    }

    #[test]
    fn test_makespan_indicator() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 3)).unwrap();
        p.add_task(Task::fixed_duration("B", 5)).unwrap();
        p.add_constraint(Constraint::task_start_at("A", 0)).unwrap();
        p.add_constraint(Constraint::task_start_at("B", 1)).unwrap();
        p.add_indicator(Indicator::makespan("makespan")).unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        assert_eq!(indicator_value(&model.unwrap(), &ctx, "makespan"), 6);
    }

    #[test]
    fn test_makespan_masks_unscheduled() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 2)).unwrap();
        p.add_task(Task::fixed_duration("Z", 9).optional()).unwrap();
        p.add_constraint(Constraint::task_start_at("A", 0)).unwrap();
        p.add_constraint(Constraint::FromExpression(crate::models::BoolExpr::Not(
            Box::new(crate::models::expr::task_scheduled("Z")),
        )))
        .unwrap();
        p.add_indicator(Indicator::makespan("makespan")).unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        assert_eq!(indicator_value(&model.unwrap(), &ctx, "makespan"), 2);
    }

    #[test]
    fn test_flowtime_and_tardiness() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 3).with_due_date(2)).unwrap();
        p.add_task(Task::fixed_duration("B", 2).with_due_date(8)).unwrap();
        p.add_constraint(Constraint::task_start_at("A", 0)).unwrap();
        p.add_constraint(Constraint::task_start_at("B", 3)).unwrap();
        p.add_indicator(Indicator::flowtime("flow")).unwrap();
        p.add_indicator(Indicator::tardiness("tardy")).unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        assert_eq!(indicator_value(&m, &ctx, "flow"), 3 + 5);
        // A ends at 3 with due 2 → tardiness 1; B on time.
        assert_eq!(indicator_value(&m, &ctx, "tardy"), 1);
    }

    #[test]
    fn test_number_tasks_assigned() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(Resource::worker("W")).unwrap();
        p.add_task(Task::fixed_duration("A", 2).with_required_resource("W"))
            .unwrap();
        p.add_task(Task::fixed_duration("B", 2).with_required_resource("W"))
            .unwrap();
        p.add_indicator(Indicator::template(
            "count",
            IndicatorExpr::NumberTasksAssigned {
                resource: "W".into(),
            },
        ))
        .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        assert_eq!(indicator_value(&model.unwrap(), &ctx, "count"), 2);
    }

    #[test]
    fn test_resource_utilization() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(Resource::worker("W")).unwrap();
        p.add_task(Task::fixed_duration("A", 4).with_required_resource("W"))
            .unwrap();
        p.add_indicator(Indicator::resource_utilization("util", "W"))
            .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        // 100 * 4 / 10 = 40
        assert_eq!(indicator_value(&model.unwrap(), &ctx, "util"), 40);
    }

    #[test]
    fn test_constant_cost_indicator() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(
            Resource::worker("W").with_cost(Function::constant(5)),
        )
        .unwrap();
        p.add_task(Task::fixed_duration("A", 4).with_required_resource("W"))
            .unwrap();
        p.add_indicator(Indicator::resource_cost("cost", ["W"]))
            .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        assert_eq!(indicator_value(&model.unwrap(), &ctx, "cost"), 20);
    }

    #[test]
    fn test_linear_cost_indicator() {
        let mut p = Problem::with_horizon("p", 6);
        p.add_resource(
            Resource::worker("W").with_cost(Function::linear(2, 1)),
        )
        .unwrap();
        p.add_task(Task::fixed_duration("A", 4).with_required_resource("W"))
            .unwrap();
        p.add_constraint(Constraint::task_start_at("A", 0)).unwrap();
        p.add_indicator(Indicator::resource_cost("cost", ["W"]))
            .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        // integral of 2t+1 over [0,4] = 16 + 4 = 20
        assert_eq!(indicator_value(&model.unwrap(), &ctx, "cost"), 20);
    }

    #[test]
    fn test_buffer_extreme_indicators() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("T", 4)).unwrap();
        p.add_buffer(crate::models::Buffer::concurrent("B").with_initial_level(5))
            .unwrap();
        p.add_constraint(Constraint::unload_buffer("T", "B", 2))
            .unwrap();
        p.add_indicator(Indicator::template(
            "bmax",
            IndicatorExpr::MaxBufferLevel { buffer: "B".into() },
        ))
        .unwrap();
        p.add_indicator(Indicator::template(
            "bmin",
            IndicatorExpr::MinBufferLevel { buffer: "B".into() },
        ))
        .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        assert_eq!(indicator_value(&m, &ctx, "bmax"), 5);
        assert_eq!(indicator_value(&m, &ctx, "bmin"), 3);
    }

    #[test]
    fn test_start_time_extremes() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 2)).unwrap();
        p.add_task(Task::fixed_duration("B", 2)).unwrap();
        p.add_constraint(Constraint::task_start_at("A", 1)).unwrap();
        p.add_constraint(Constraint::task_start_at("B", 6)).unwrap();
        p.add_indicator(Indicator::template(
            "first_start",
            IndicatorExpr::SmallestStartTime,
        ))
        .unwrap();
        p.add_indicator(Indicator::template(
            "last_start",
            IndicatorExpr::LargestStartTime,
        ))
        .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        assert_eq!(indicator_value(&m, &ctx, "first_start"), 1);
        assert_eq!(indicator_value(&m, &ctx, "last_start"), 6);
    }

    #[test]
    fn test_indicator_bounds_tighten() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 2)).unwrap();
        p.add_indicator(Indicator::makespan("makespan").with_bounds(0, 4))
            .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        assert!(indicator_value(&model.unwrap(), &ctx, "makespan") <= 4);
    }
}
