//! Constraint lowering.
//!
//! Each attached constraint lowers to one boolean term over the global
//! variable pool. Interval-position constraints are guarded by the
//! scheduled flags of the tasks they mention; counting and dependency
//! constraints over optional tasks are not (their semantics quantify
//! over the flags themselves). Optional constraints get an `applied`
//! guard on top.
//!
//! First-order combinators reify every child with a fresh boolean that
//! is asserted equivalent to the child's lowered term, so the
//! combinator itself is a plain boolean formula.

use crate::error::EncodeError;
use crate::models::{
    Constraint, CountKind, DistanceMode, PrecedenceKind, TimeInterval,
};
use crate::smt::Term;

use super::context::{BusyClaim, EncoderCtx};
use super::exprs::lower_bool_expr;

/// Lowers and asserts every constraint attached to the problem.
pub fn encode_constraints(ctx: &mut EncoderCtx<'_>) -> Result<(), EncodeError> {
    let problem = ctx.problem;
    for def in problem.constraints() {
        // Buffer linkage is structural and handled by the buffer pass.
        if matches!(
            def.constraint,
            Constraint::TaskLoadBuffer { .. } | Constraint::TaskUnloadBuffer { .. }
        ) {
            continue;
        }
        let term = lower(ctx, &def.name, &def.constraint)?;
        if def.optional {
            let uid = problem
                .uid_of("constraint", &def.name)
                .expect("attached constraint is registered");
            let applied = ctx.declare_bool(format!("Constraint_{}_{uid}_applied", def.name));
            ctx.applied_vars.insert(def.name.clone(), applied.clone());
            ctx.assert(def.name.as_str(), Term::bool_var(applied).implies(term));
        } else {
            ctx.assert(def.name.as_str(), term);
        }
    }
    Ok(())
}

/// Lowers one constraint node to a guarded boolean term.
fn lower(
    ctx: &mut EncoderCtx<'_>,
    referrer: &str,
    constraint: &Constraint,
) -> Result<Term, EncodeError> {
    use Constraint::*;
    Ok(match constraint {
        TaskStartAt { task, value } => {
            let tv = ctx.task_vars_of(referrer, task)?;
            guard1(tv.scheduled_term(), tv.start_term().eq(Term::Int(*value)))
        }
        TaskEndAt { task, value } => {
            let tv = ctx.task_vars_of(referrer, task)?;
            guard1(tv.scheduled_term(), tv.end_term().eq(Term::Int(*value)))
        }
        TaskStartAfter { task, value, kind } => {
            let tv = ctx.task_vars_of(referrer, task)?;
            let body = match kind {
                crate::models::BoundKind::Lax => tv.start_term().ge(Term::Int(*value)),
                crate::models::BoundKind::Strict => tv.start_term().gt(Term::Int(*value)),
            };
            guard1(tv.scheduled_term(), body)
        }
        TaskEndBefore { task, value, kind } => {
            let tv = ctx.task_vars_of(referrer, task)?;
            let body = match kind {
                crate::models::BoundKind::Lax => tv.end_term().le(Term::Int(*value)),
                crate::models::BoundKind::Strict => tv.end_term().lt(Term::Int(*value)),
            };
            guard1(tv.scheduled_term(), body)
        }
        TaskPrecedence {
            before,
            after,
            kind,
            offset,
        } => precedence_term(ctx, referrer, before, after, *kind, *offset)?,
        TasksStartSynced { a, b } => {
            let ta = ctx.task_vars_of(referrer, a)?.clone();
            let tb = ctx.task_vars_of(referrer, b)?;
            guard2(
                ta.scheduled_term(),
                tb.scheduled_term(),
                ta.start_term().eq(tb.start_term()),
            )
        }
        TasksEndSynced { a, b } => {
            let ta = ctx.task_vars_of(referrer, a)?.clone();
            let tb = ctx.task_vars_of(referrer, b)?;
            guard2(
                ta.scheduled_term(),
                tb.scheduled_term(),
                ta.end_term().eq(tb.end_term()),
            )
        }
        TasksDontOverlap { a, b } => {
            let ta = ctx.task_vars_of(referrer, a)?.clone();
            let tb = ctx.task_vars_of(referrer, b)?;
            guard2(
                ta.scheduled_term(),
                tb.scheduled_term(),
                Term::or(vec![
                    ta.end_term().le(tb.start_term()),
                    tb.end_term().le(ta.start_term()),
                ]),
            )
        }
        TasksContiguous { tasks } => {
            let mut parts = Vec::new();
            for pair in tasks.windows(2) {
                let ta = ctx.task_vars_of(referrer, &pair[0])?.clone();
                let tb = ctx.task_vars_of(referrer, &pair[1])?;
                parts.push(guard2(
                    ta.scheduled_term(),
                    tb.scheduled_term(),
                    ta.end_term().eq(tb.start_term()),
                ));
            }
            Term::and(parts)
        }
        OrderedTaskGroup { tasks, kind } => {
            let mut parts = Vec::new();
            for pair in tasks.windows(2) {
                parts.push(precedence_term(ctx, referrer, &pair[0], &pair[1], *kind, 0)?);
            }
            Term::and(parts)
        }
        UnorderedTaskGroup { tasks, window } => {
            let mut parts = Vec::new();
            for task in tasks {
                let tv = ctx.task_vars_of(referrer, task)?;
                parts.push(guard1(
                    tv.scheduled_term(),
                    Term::and(vec![
                        tv.start_term().ge(Term::Int(window.start)),
                        tv.end_term().le(Term::Int(window.end)),
                    ]),
                ));
            }
            Term::and(parts)
        }
        ScheduleNTasksInTimeIntervals {
            tasks,
            n,
            intervals,
            kind,
        } => {
            let mut flags = Vec::new();
            for task in tasks {
                let tv = ctx.task_vars_of(referrer, task)?;
                let inside = Term::or(
                    intervals
                        .iter()
                        .map(|iv| {
                            Term::and(vec![
                                tv.start_term().ge(Term::Int(iv.start)),
                                tv.end_term().le(Term::Int(iv.end)),
                            ])
                        })
                        .collect(),
                );
                flags.push(Term::ite(
                    Term::and(vec![tv.scheduled_term(), inside]),
                    Term::Int(1),
                    Term::Int(0),
                ));
            }
            count_compare(Term::sum(flags), *kind, *n)
        }
        ForceScheduleNOptionalTasks { tasks, n, kind } => {
            let mut flags = Vec::new();
            for task in tasks {
                let tv = ctx.task_vars_of(referrer, task)?;
                flags.push(Term::ite(tv.scheduled_term(), Term::Int(1), Term::Int(0)));
            }
            count_compare(Term::sum(flags), *kind, *n)
        }
        OptionalTasksDependency { a, b } => {
            let ta = ctx.task_vars_of(referrer, a)?.clone();
            let tb = ctx.task_vars_of(referrer, b)?;
            ta.scheduled_term().implies(tb.scheduled_term())
        }
        OptionalTaskConditionSchedule { task, condition } => {
            let cond = lower_bool_expr(ctx, referrer, condition)?;
            let tv = ctx.task_vars_of(referrer, task)?;
            cond.implies(tv.scheduled_term())
        }
        TaskLoadBuffer { .. } | TaskUnloadBuffer { .. } => Term::Bool(true),

        WorkLoad {
            resource,
            windows,
            kind,
        } => {
            ctx.resource(referrer, resource)?;
            let claims = ctx.claims_on(resource);
            let mut parts = Vec::new();
            for (window, n) in windows {
                let total = Term::sum(
                    claims
                        .iter()
                        .map(|c| overlap_duration(c, *window))
                        .collect(),
                );
                parts.push(count_compare(total, *kind, *n));
            }
            Term::and(parts)
        }
        ResourceUnavailable {
            resource,
            intervals,
        } => {
            ctx.resource(referrer, resource)?;
            let claims = ctx.claims_on(resource);
            let mut parts = Vec::new();
            for window in intervals {
                for claim in &claims {
                    parts.push(overlap_duration(claim, *window).eq(Term::Int(0)));
                }
            }
            Term::and(parts)
        }
        ResourceNonDelay { resource } => {
            resource_chain(ctx, referrer, resource, 0, None, DistanceMode::Exact)?
        }
        ResourceTasksDistance {
            resource,
            distance,
            intervals,
            mode,
        } => resource_chain(
            ctx,
            referrer,
            resource,
            *distance,
            intervals.as_deref(),
            *mode,
        )?,
        DistinctWorkers { a, b } => {
            let sa = ctx.select_node(referrer, a)?.picked.clone();
            let sb = ctx.select_node(referrer, b)?;
            let mut parts = Vec::new();
            for (worker, va) in &sa {
                if let Some((_, vb)) = sb.picked.iter().find(|(w, _)| w == worker) {
                    parts.push(Term::Not(Box::new(Term::and(vec![
                        Term::bool_var(va),
                        Term::bool_var(vb),
                    ]))));
                }
            }
            Term::and(parts)
        }
        SameWorkers { a, b } => {
            let sa = ctx.select_node(referrer, a)?.picked.clone();
            let sb = ctx.select_node(referrer, b)?.picked.clone();
            let mut parts = Vec::new();
            for (worker, va) in &sa {
                match sb.iter().find(|(w, _)| w == worker) {
                    Some((_, vb)) => parts.push(Term::Iff(
                        Box::new(Term::bool_var(va)),
                        Box::new(Term::bool_var(vb)),
                    )),
                    // A candidate only one side can pick must stay unpicked.
                    None => parts.push(Term::Not(Box::new(Term::bool_var(va)))),
                }
            }
            for (worker, vb) in &sb {
                if !sa.iter().any(|(w, _)| w == worker) {
                    parts.push(Term::Not(Box::new(Term::bool_var(vb))));
                }
            }
            Term::and(parts)
        }

        And(children) => {
            let bs = reify_children(ctx, referrer, children)?;
            Term::and(bs)
        }
        Or(children) => {
            let bs = reify_children(ctx, referrer, children)?;
            Term::or(bs)
        }
        Xor(a, b) => {
            let ba = reify(ctx, referrer, a)?;
            let bb = reify(ctx, referrer, b)?;
            Term::Xor(Box::new(ba), Box::new(bb))
        }
        Not(child) => {
            let b = reify(ctx, referrer, child)?;
            Term::Not(Box::new(b))
        }
        Implies { condition, then } => {
            let cond = lower_bool_expr(ctx, referrer, condition)?;
            let bs = reify_children(ctx, referrer, then)?;
            cond.implies(Term::and(bs))
        }
        IfThenElse {
            condition,
            then,
            otherwise,
        } => {
            let cond = lower_bool_expr(ctx, referrer, condition)?;
            let thens = reify_children(ctx, referrer, then)?;
            let elses = reify_children(ctx, referrer, otherwise)?;
            Term::and(vec![
                cond.clone().implies(Term::and(thens)),
                Term::Not(Box::new(cond)).implies(Term::and(elses)),
            ])
        }
        FromExpression(expr) => lower_bool_expr(ctx, referrer, expr)?,
    })
}

/// Reifies a child constraint: a fresh boolean equivalent to its term.
fn reify(
    ctx: &mut EncoderCtx<'_>,
    referrer: &str,
    child: &Constraint,
) -> Result<Term, EncodeError> {
    let term = lower(ctx, referrer, child)?;
    let name = ctx.fresh_bool("reify");
    ctx.assert(
        referrer,
        Term::Iff(Box::new(Term::bool_var(&name)), Box::new(term)),
    );
    Ok(Term::bool_var(name))
}

fn reify_children(
    ctx: &mut EncoderCtx<'_>,
    referrer: &str,
    children: &[Constraint],
) -> Result<Vec<Term>, EncodeError> {
    children.iter().map(|c| reify(ctx, referrer, c)).collect()
}

fn precedence_term(
    ctx: &mut EncoderCtx<'_>,
    referrer: &str,
    before: &str,
    after: &str,
    kind: PrecedenceKind,
    offset: i64,
) -> Result<Term, EncodeError> {
    let tb = ctx.task_vars_of(referrer, before)?.clone();
    let ta = ctx.task_vars_of(referrer, after)?;
    let lhs = tb.end_term().plus(Term::Int(offset));
    let body = match kind {
        PrecedenceKind::Lax => lhs.le(ta.start_term()),
        PrecedenceKind::Strict => lhs.lt(ta.start_term()),
        PrecedenceKind::Tight => lhs.eq(ta.start_term()),
    };
    Ok(guard2(tb.scheduled_term(), ta.scheduled_term(), body))
}

fn guard1(guard: Term, body: Term) -> Term {
    match guard {
        Term::Bool(true) => body,
        g => g.implies(body),
    }
}

fn guard2(ga: Term, gb: Term, body: Term) -> Term {
    let guard = match (ga, gb) {
        (Term::Bool(true), Term::Bool(true)) => Term::Bool(true),
        (Term::Bool(true), g) | (g, Term::Bool(true)) => g,
        (a, b) => Term::and(vec![a, b]),
    };
    guard1(guard, body)
}

fn count_compare(total: Term, kind: CountKind, n: i64) -> Term {
    match kind {
        CountKind::Exact => total.eq(Term::Int(n)),
        CountKind::AtLeast => total.ge(Term::Int(n)),
        CountKind::AtMost => total.le(Term::Int(n)),
    }
}

/// Busy time of a claim inside a static window, as a term.
///
/// `max(0, min(end, b) - max(start, a))`; parked claims contribute 0.
fn overlap_duration(claim: &BusyClaim, window: TimeInterval) -> Term {
    let start = claim.start_term();
    let end = claim.end_term();
    let clipped_start = Term::ite(
        start.clone().ge(Term::Int(window.start)),
        start,
        Term::Int(window.start),
    );
    let clipped_end = Term::ite(
        end.clone().le(Term::Int(window.end)),
        end,
        Term::Int(window.end),
    );
    let raw = clipped_end.minus(clipped_start);
    Term::ite(raw.clone().ge(Term::Int(0)), raw, Term::Int(0))
}

/// Shared chain encoding for `ResourceNonDelay` and
/// `ResourceTasksDistance`: a position permutation over the claims on
/// the resource, time-consistent for assigned pairs, with the gap
/// constraint on immediate successors.
fn resource_chain(
    ctx: &mut EncoderCtx<'_>,
    referrer: &str,
    resource: &str,
    distance: i64,
    intervals: Option<&[TimeInterval]>,
    mode: DistanceMode,
) -> Result<Term, EncodeError> {
    ctx.resource(referrer, resource)?;
    let claims = ctx.claims_on(resource);
    if claims.len() <= 1 {
        return Ok(Term::Bool(true));
    }
    let positions: Vec<String> = claims
        .iter()
        .map(|c| ctx.fresh_int(&format!("pos_{}_{}", resource, c.task)))
        .collect();
    let mut parts = Vec::new();
    let n = claims.len() as i64;
    for pos in &positions {
        parts.push(Term::int_var(pos).ge(Term::Int(0)));
        parts.push(Term::int_var(pos).lt(Term::Int(n)));
    }
    for i in 0..claims.len() {
        for j in 0..claims.len() {
            if i == j {
                continue;
            }
            let pi = Term::int_var(&positions[i]);
            let pj = Term::int_var(&positions[j]);
            if i < j {
                parts.push(pi.clone().ne(pj.clone()));
            }
            let both = Term::and(vec![
                claims[i].assigned_term(),
                claims[j].assigned_term(),
            ]);
            // Positions follow time order.
            parts.push(
                Term::and(vec![both.clone(), pi.clone().lt(pj.clone())])
                    .implies(claims[i].end_term().le(claims[j].start_term())),
            );
            // Gap constraint between immediate successors.
            let gap = claims[j].start_term().minus(claims[i].end_term());
            let gap_ok = match mode {
                DistanceMode::Exact => gap.eq(Term::Int(distance)),
                DistanceMode::Min => gap.ge(Term::Int(distance)),
                DistanceMode::Max => gap.le(Term::Int(distance)),
            };
            let mut chain_guard = vec![
                both,
                pj.eq(pi.plus(Term::Int(1))),
            ];
            if let Some(windows) = intervals {
                // Only pairs lying inside one of the windows are bound.
                chain_guard.push(Term::or(
                    windows
                        .iter()
                        .map(|w| {
                            Term::and(vec![
                                claims[i].end_term().ge(Term::Int(w.start)),
                                claims[j].start_term().le(Term::Int(w.end)),
                            ])
                        })
                        .collect(),
                ));
            }
            parts.push(Term::and(chain_guard).implies(gap_ok));
        }
    }
    Ok(Term::and(parts))
}
