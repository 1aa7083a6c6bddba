//! Task encoding.
//!
//! Per task: `start`, `end`, `duration` integer variables and, for
//! optional tasks, a `scheduled` boolean. A scheduled task satisfies
//! `end = start + duration`, `0 <= start`, `end <= horizon` plus the
//! variant's duration policy; an unscheduled task is pinned to the
//! sentinel interval `(-1, -1)` with zero duration, which keeps it out
//! of every resource and indicator clause.

use crate::models::{DurationSpec, Task};
use crate::smt::Term;

use super::context::{EncoderCtx, TaskVars};

/// Declares variables and emits interval assertions for all tasks.
pub fn encode_tasks(ctx: &mut EncoderCtx<'_>) {
    let problem = ctx.problem;
    for task in problem.tasks() {
        let uid = problem
            .uid_of("task", &task.name)
            .expect("attached task is registered");
        let prefix = format!("Task_{}_{uid}", task.name);
        let vars = TaskVars {
            start: ctx.declare_int(format!("{prefix}_start")),
            end: ctx.declare_int(format!("{prefix}_end")),
            duration: ctx.declare_int(format!("{prefix}_duration")),
            scheduled: task
                .optional
                .then(|| ctx.declare_bool(format!("{prefix}_scheduled"))),
        };
        emit_interval(ctx, task, &vars);
        ctx.task_vars.insert(task.name.clone(), vars);
    }
}

fn emit_interval(ctx: &mut EncoderCtx<'_>, task: &Task, vars: &TaskVars) {
    let label = format!("task:{}", task.name);
    let start = vars.start_term();
    let end = vars.end_term();
    let duration = vars.duration_term();

    let mut body = vec![
        end.clone().eq(start.clone().plus(duration.clone())),
        start.clone().ge(Term::Int(0)),
        end.clone().le(ctx.horizon_term()),
    ];
    body.push(duration_policy(task, &duration));
    if let Some(release) = task.release_date {
        body.push(start.clone().ge(Term::Int(release)));
    }
    if let (Some(due), true) = (task.due_date, task.due_date_is_deadline) {
        body.push(end.clone().le(Term::Int(due)));
    }

    match &vars.scheduled {
        None => {
            for term in body {
                ctx.assert(label.as_str(), term);
            }
        }
        Some(flag) => {
            let scheduled = Term::bool_var(flag);
            ctx.assert(
                label.as_str(),
                scheduled.clone().implies(Term::and(body)),
            );
            // Unscheduled tasks sit on the sentinel instant in the past.
            let pinned = Term::and(vec![
                start.eq(Term::Int(-1)),
                end.eq(Term::Int(-1)),
                duration.eq(Term::Int(0)),
            ]);
            ctx.assert(
                label.as_str(),
                Term::Not(Box::new(scheduled)).implies(pinned),
            );
        }
    }
}

fn duration_policy(task: &Task, duration: &Term) -> Term {
    match &task.duration {
        DurationSpec::Zero => duration.clone().eq(Term::Int(0)),
        DurationSpec::Fixed(d) => duration.clone().eq(Term::Int(*d)),
        DurationSpec::Variable { min, max, allowed } => {
            if let Some(values) = allowed {
                return Term::or(
                    values
                        .iter()
                        .map(|v| duration.clone().eq(Term::Int(*v)))
                        .collect(),
                );
            }
            let mut parts = vec![duration.clone().ge(Term::Int(*min))];
            if let Some(max) = max {
                parts.push(duration.clone().le(Term::Int(*max)));
            }
            Term::and(parts)
        }
    }
}
