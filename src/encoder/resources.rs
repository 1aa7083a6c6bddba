//! Resource-to-task encoding.
//!
//! Every (task, resource) requirement owns a busy interval: two integer
//! variables synchronized with the task interval while the claim is
//! active and collapsed to `(-1, -1)` otherwise. Worker exclusion is a
//! pairwise disjunction over busy intervals; cumulative capacity is a
//! per-start-instant occupancy sum; `SelectWorkers` adds selection
//! booleans under a cardinality constraint; work amounts compare
//! productivity-weighted busy lengths against the task demand.

use crate::error::EncodeError;
use crate::models::{ResourceRequirement, SelectKind};
use crate::smt::Term;

use super::context::{BusyClaim, EncoderCtx, SelectNode};

/// Declares busy intervals and emits all resource clauses.
pub fn encode_resources(ctx: &mut EncoderCtx<'_>) -> Result<(), EncodeError> {
    declare_claims(ctx)?;
    emit_exclusion(ctx);
    emit_work_amounts(ctx);
    Ok(())
}

fn declare_claims(ctx: &mut EncoderCtx<'_>) -> Result<(), EncodeError> {
    let problem = ctx.problem;
    for task in problem.tasks() {
        let referrer = format!("task '{}'", task.name);
        for req in &task.requirements {
            match req {
                ResourceRequirement::Worker { resource, dynamic } => {
                    ctx.resource(&referrer, resource)?;
                    let claim = new_claim(ctx, &task.name, resource, None, *dynamic);
                    emit_claim_sync(ctx, &task.name, &claim);
                    ctx.claims.push(claim);
                }
                ResourceRequirement::Select(select) => {
                    let uid = select
                        .name
                        .as_ref()
                        .and_then(|n| problem.uid_of("select", n))
                        .unwrap_or_else(|| {
                            problem
                                .uid_of("task", &task.name)
                                .expect("attached task is registered")
                        });
                    let base = select.name.clone().unwrap_or_else(|| task.name.clone());
                    let mut picked = Vec::new();
                    for worker in &select.workers {
                        ctx.resource(&referrer, worker)?;
                        let picked_var = ctx
                            .declare_bool(format!("Select_{base}_{uid}_picked_{worker}"));
                        let claim = new_claim(
                            ctx,
                            &task.name,
                            worker,
                            Some(picked_var.clone()),
                            false,
                        );
                        emit_claim_sync(ctx, &task.name, &claim);
                        ctx.claims.push(claim);
                        picked.push((worker.clone(), picked_var));
                    }
                    emit_cardinality(ctx, &task.name, select.kind, select.n, &picked);
                    ctx.selects.push(SelectNode {
                        name: select.name.clone(),
                        task: task.name.clone(),
                        picked,
                    });
                }
            }
        }
    }
    Ok(())
}

fn new_claim(
    ctx: &mut EncoderCtx<'_>,
    task: &str,
    resource: &str,
    picked_var: Option<String>,
    dynamic: bool,
) -> BusyClaim {
    let uid = ctx
        .problem
        .uid_of("resource", resource)
        .expect("resource existence checked by caller");
    let prefix = format!("Resource_{resource}_{uid}_busy_{task}");
    BusyClaim {
        resource: resource.to_string(),
        task: task.to_string(),
        start_var: ctx.declare_int(format!("{prefix}_start")),
        end_var: ctx.declare_int(format!("{prefix}_end")),
        picked_var,
        dynamic,
    }
}

/// Ties a busy interval to its task interval.
///
/// Active claim: `[start, end]` for a static resource, `[join, end]`
/// with `join` in `[start, end]` for a dynamic one. Inactive claim
/// (task unscheduled, or candidate not picked): `(-1, -1)`.
fn emit_claim_sync(ctx: &mut EncoderCtx<'_>, task: &str, claim: &BusyClaim) {
    let label = format!("resource:{}", claim.resource);
    let tv = &ctx.task_vars[task];
    let scheduled = tv.scheduled_term();
    let start = tv.start_term();
    let end = tv.end_term();
    let active = match &claim.picked_var {
        Some(p) => Term::and(vec![scheduled, Term::bool_var(p)]),
        None => scheduled,
    };
    let sync = if claim.dynamic {
        Term::and(vec![
            claim.start_term().ge(start),
            claim.start_term().le(claim.end_term()),
            claim.end_term().eq(end),
        ])
    } else {
        Term::and(vec![
            claim.start_term().eq(start),
            claim.end_term().eq(end),
        ])
    };
    let parked = Term::and(vec![
        claim.start_term().eq(Term::Int(-1)),
        claim.end_term().eq(Term::Int(-1)),
    ]);
    ctx.assert(label.as_str(), active.clone().implies(sync));
    ctx.assert(label.as_str(), Term::Not(Box::new(active)).implies(parked));
}

fn emit_cardinality(
    ctx: &mut EncoderCtx<'_>,
    task: &str,
    kind: SelectKind,
    n: usize,
    picked: &[(String, String)],
) {
    let count = Term::sum(
        picked
            .iter()
            .map(|(_, var)| Term::ite(Term::bool_var(var), Term::Int(1), Term::Int(0)))
            .collect(),
    );
    let target = Term::Int(n as i64);
    let cardinality = match kind {
        SelectKind::Exact => count.eq(target),
        SelectKind::AtLeast => count.ge(target),
        SelectKind::AtMost => count.le(target),
    };
    let scheduled = ctx.task_vars[task].scheduled_term();
    ctx.assert(
        format!("task:{task}"),
        scheduled.implies(cardinality),
    );
}

/// Worker exclusion and cumulative capacity.
fn emit_exclusion(ctx: &mut EncoderCtx<'_>) {
    let problem = ctx.problem;
    for resource in problem.resources() {
        let claims = ctx.claims_on(&resource.name);
        if claims.len() <= 1 {
            continue;
        }
        let label = format!("resource:{}", resource.name);
        if resource.is_worker() {
            // Pairwise non-overlap; parked intervals satisfy it trivially.
            for i in 0..claims.len() {
                for j in (i + 1)..claims.len() {
                    ctx.assert(
                        label.as_str(),
                        Term::or(vec![
                            claims[i].end_term().le(claims[j].start_term()),
                            claims[j].end_term().le(claims[i].start_term()),
                        ]),
                    );
                }
            }
        } else {
            // Occupancy at each claim start stays within capacity. A
            // piecewise-constant usage count peaks at a start instant,
            // so start instants are the only sample points needed.
            for i in 0..claims.len() {
                let at = claims[i].start_term();
                let occupancy = Term::sum(
                    claims
                        .iter()
                        .map(|c| {
                            Term::ite(
                                Term::and(vec![
                                    c.start_term().le(at.clone()),
                                    at.clone().lt(c.end_term()),
                                ]),
                                Term::Int(1),
                                Term::Int(0),
                            )
                        })
                        .collect(),
                );
                ctx.assert(
                    label.as_str(),
                    claims[i]
                        .assigned_term()
                        .implies(occupancy.le(Term::Int(resource.size))),
                );
            }
        }
    }
}

/// `sum(productivity * busy length) >= work_amount` per demanding task.
fn emit_work_amounts(ctx: &mut EncoderCtx<'_>) {
    let problem = ctx.problem;
    for task in problem.tasks() {
        if task.work_amount == 0 {
            continue;
        }
        let contributions: Vec<Term> = ctx
            .claims
            .iter()
            .filter(|c| c.task == task.name)
            .filter_map(|c| {
                let productivity = ctx.problem.resource(&c.resource)?.productivity;
                if productivity == 0 {
                    return None;
                }
                // Parked claims have zero length, contributing nothing.
                Some(
                    Term::Int(productivity)
                        .times(c.end_term().minus(c.start_term())),
                )
            })
            .collect();
        // With no productive worker the sum is the empty sum: the clause
        // then demands 0 >= work_amount, making the demand unmeetable.
        let scheduled = ctx.task_vars[&task.name].scheduled_term();
        ctx.assert(
            format!("task:{}", task.name),
            scheduled.implies(Term::sum(contributions).ge(Term::Int(task.work_amount))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tasks::encode_tasks;
    use crate::models::{Problem, Resource, SelectWorkers, Task};
    use crate::smt::{BuiltinBackend, CheckOutcome, SmtBackend};

    fn solve(problem: &Problem) -> (CheckOutcome, Option<crate::smt::Model>, EncoderCtx<'_>) {
        let mut ctx = EncoderCtx::new(problem);
        ctx.declare_int("horizon");
        let ceiling = problem.horizon_ceiling();
        ctx.assert("horizon", ctx.horizon_term().ge(Term::Int(0)));
        ctx.assert("horizon", ctx.horizon_term().le(Term::Int(ceiling)));
        if let Some(h) = problem.fixed_horizon() {
            ctx.assert("horizon", ctx.horizon_term().eq(Term::Int(h)));
        }
        encode_tasks(&mut ctx);
        encode_resources(&mut ctx).unwrap();
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

    #[test]
    fn test_worker_exclusion() {
        let mut p = Problem::with_horizon("p", 6);
        p.add_resource(Resource::worker("W")).unwrap();
        p.add_task(Task::fixed_duration("A", 3).with_required_resource("W"))
            .unwrap();
        p.add_task(Task::fixed_duration("B", 3).with_required_resource("W"))
            .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        let a = &ctx.task_vars["A"];
        let b = &ctx.task_vars["B"];
        assert!(m.int(&a.end) <= m.int(&b.start) || m.int(&b.end) <= m.int(&a.start));
    }

    #[test]
    fn test_worker_exclusion_infeasible_horizon() {
        let mut p = Problem::with_horizon("p", 5);
        p.add_resource(Resource::worker("W")).unwrap();
        p.add_task(Task::fixed_duration("A", 3).with_required_resource("W"))
            .unwrap();
        p.add_task(Task::fixed_duration("B", 3).with_required_resource("W"))
            .unwrap();
        let (outcome, _, _) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Unsat);
    }

    #[test]
    fn test_cumulative_capacity_two_of_three() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(Resource::cumulative_worker("M", 2)).unwrap();
        for name in ["A", "B", "C"] {
            p.add_task(Task::fixed_duration(name, 5).with_required_resource("M"))
                .unwrap();
        }
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        // At every start instant at most 2 tasks overlap.
        let intervals: Vec<(i64, i64)> = ["A", "B", "C"]
            .iter()
            .map(|n| {
                let v = &ctx.task_vars[*n];
                (m.int(&v.start), m.int(&v.end))
            })
            .collect();
        for &(s, _) in &intervals {
            let overlapping = intervals
                .iter()
                .filter(|&&(os, oe)| os <= s && s < oe)
                .count();
            assert!(overlapping <= 2, "occupancy {overlapping} at {s}");
        }
    }

    #[test]
    fn test_cumulative_capacity_infeasible() {
        // Three five-period tasks cannot share a 2-wide resource in 7 periods.
        let mut p = Problem::with_horizon("p", 7);
        p.add_resource(Resource::cumulative_worker("M", 2)).unwrap();
        for name in ["A", "B", "C"] {
            p.add_task(Task::fixed_duration(name, 5).with_required_resource("M"))
                .unwrap();
        }
        let (outcome, _, _) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Unsat);
    }

    #[test]
    fn test_select_workers_exactly_one() {
        let mut p = Problem::with_horizon("p", 4);
        p.add_resource(Resource::worker("W1")).unwrap();
        p.add_resource(Resource::worker("W2")).unwrap();
        p.add_task(Task::fixed_duration("T", 2).with_select_workers(SelectWorkers::new(
            ["W1", "W2"],
            1,
            SelectKind::Exact,
        )))
        .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        let picked: usize = ctx.selects[0]
            .picked
            .iter()
            .filter(|(_, var)| m.bool(var))
            .count();
        assert_eq!(picked, 1);
        // The unpicked candidate's busy interval is parked.
        for claim in &ctx.claims {
            let active = claim
                .picked_var
                .as_ref()
                .map(|v| m.bool(v))
                .unwrap_or(true);
            if active {
                assert!(m.int(&claim.start_var) >= 0);
            } else {
                assert_eq!(m.int(&claim.start_var), -1);
                assert_eq!(m.int(&claim.end_var), -1);
            }
        }
    }

    #[test]
    fn test_work_amount_requires_productive_worker() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(Resource::worker("W").with_productivity(2))
            .unwrap();
        p.add_task(
            Task::variable_duration("T")
                .with_min_duration(1)
                .with_required_resource("W")
                .with_work_amount(8),
        )
        .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        // productivity 2 * duration >= 8 → duration >= 4
        assert!(m.int(&ctx.task_vars["T"].duration) >= 4);
    }

    #[test]
    fn test_work_amount_unmeetable_without_productivity() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(Resource::worker("W")).unwrap();
        p.add_task(
            Task::fixed_duration("T", 5)
                .with_required_resource("W")
                .with_work_amount(3),
        )
        .unwrap();
        let (outcome, _, _) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Unsat);
    }

    #[test]
    fn test_dynamic_worker_joins_late() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(Resource::worker("W1").with_productivity(1))
            .unwrap();
        p.add_resource(Resource::worker("W2").with_productivity(1))
            .unwrap();
        // Work 12 over duration 8: W1 alone provides 8, the dynamic W2
        // must join for at least 4 periods.
        p.add_task(
            Task::fixed_duration("T", 8)
                .with_required_resource("W1")
                .with_dynamic_resource("W2")
                .with_work_amount(12),
        )
        .unwrap();
        let (outcome, model, ctx) = solve(&p);
        assert_eq!(outcome, CheckOutcome::Sat);
        let m = model.unwrap();
        let w2 = ctx
            .claims
            .iter()
            .find(|c| c.resource == "W2")
            .unwrap();
        let joined = m.int(&w2.end_var) - m.int(&w2.start_var);
        assert!(joined >= 4, "dynamic worker joined only {joined} periods");
        let t = &ctx.task_vars["T"];
        assert!(m.int(&w2.start_var) >= m.int(&t.start));
        assert_eq!(m.int(&w2.end_var), m.int(&t.end));
    }

    #[test]
    fn test_unknown_resource_reference() {
        let mut p = Problem::with_horizon("p", 5);
        p.add_task(Task::fixed_duration("T", 1).with_required_resource("ghost"))
            .unwrap();
        let mut ctx = EncoderCtx::new(&p);
        ctx.declare_int("horizon");
        encode_tasks(&mut ctx);
        let err = encode_resources(&mut ctx).unwrap_err();
        assert!(matches!(err, EncodeError::UnknownReference { kind: "resource", .. }));
    }
}
