//! Lowering of model-level expressions to SMT terms.
//!
//! [`IntExpr`]/[`BoolExpr`] reference entities by name; this pass
//! resolves the names against the encoder context and produces plain
//! terms. Indicator references resolve through the pre-allocated
//! indicator variable table, so expressions may mention indicators
//! declared later in the problem.

use crate::error::EncodeError;
use crate::models::{BoolExpr, CmpOp, IntExpr};
use crate::smt::Term;

use super::context::EncoderCtx;

/// Lowers an integer expression.
pub fn lower_int_expr(
    ctx: &EncoderCtx<'_>,
    referrer: &str,
    expr: &IntExpr,
) -> Result<Term, EncodeError> {
    Ok(match expr {
        IntExpr::Const(v) => Term::Int(*v),
        IntExpr::TaskStart(name) => ctx.task_vars_of(referrer, name)?.start_term(),
        IntExpr::TaskEnd(name) => ctx.task_vars_of(referrer, name)?.end_term(),
        IntExpr::TaskDuration(name) => ctx.task_vars_of(referrer, name)?.duration_term(),
        IntExpr::Horizon => ctx.horizon_term(),
        IntExpr::Indicator(name) => {
            let var = ctx.indicator_vars.get(name).ok_or_else(|| {
                EncodeError::UnknownReference {
                    referrer: referrer.to_string(),
                    kind: "indicator",
                    name: name.clone(),
                }
            })?;
            Term::int_var(var)
        }
        IntExpr::Add(parts) => Term::sum(
            parts
                .iter()
                .map(|p| lower_int_expr(ctx, referrer, p))
                .collect::<Result<_, _>>()?,
        ),
        IntExpr::Sub(a, b) => lower_int_expr(ctx, referrer, a)?
            .minus(lower_int_expr(ctx, referrer, b)?),
        IntExpr::Mul(a, b) => lower_int_expr(ctx, referrer, a)?
            .times(lower_int_expr(ctx, referrer, b)?),
        IntExpr::Neg(a) => Term::Neg(Box::new(lower_int_expr(ctx, referrer, a)?)),
        IntExpr::Ite(c, a, b) => Term::ite(
            lower_bool_expr(ctx, referrer, c)?,
            lower_int_expr(ctx, referrer, a)?,
            lower_int_expr(ctx, referrer, b)?,
        ),
    })
}

/// Lowers a boolean expression.
pub fn lower_bool_expr(
    ctx: &EncoderCtx<'_>,
    referrer: &str,
    expr: &BoolExpr,
) -> Result<Term, EncodeError> {
    Ok(match expr {
        BoolExpr::Const(b) => Term::Bool(*b),
        BoolExpr::TaskScheduled(name) => ctx.task_vars_of(referrer, name)?.scheduled_term(),
        BoolExpr::Cmp(op, a, b) => {
            let lhs = lower_int_expr(ctx, referrer, a)?;
            let rhs = lower_int_expr(ctx, referrer, b)?;
            match op {
                CmpOp::Eq => lhs.eq(rhs),
                CmpOp::Ne => lhs.ne(rhs),
                CmpOp::Lt => lhs.lt(rhs),
                CmpOp::Le => lhs.le(rhs),
                CmpOp::Gt => lhs.gt(rhs),
                CmpOp::Ge => lhs.ge(rhs),
            }
        }
        BoolExpr::And(parts) => Term::and(
            parts
                .iter()
                .map(|p| lower_bool_expr(ctx, referrer, p))
                .collect::<Result<_, _>>()?,
        ),
        BoolExpr::Or(parts) => Term::or(
            parts
                .iter()
                .map(|p| lower_bool_expr(ctx, referrer, p))
                .collect::<Result<_, _>>()?,
        ),
        BoolExpr::Not(a) => Term::Not(Box::new(lower_bool_expr(ctx, referrer, a)?)),
        BoolExpr::Implies(a, b) => lower_bool_expr(ctx, referrer, a)?
            .implies(lower_bool_expr(ctx, referrer, b)?),
        BoolExpr::Xor(a, b) => Term::Xor(
            Box::new(lower_bool_expr(ctx, referrer, a)?),
            Box::new(lower_bool_expr(ctx, referrer, b)?),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tasks::encode_tasks;
    use crate::models::expr::{task_end, task_start};
    use crate::models::{Problem, Task};

    #[test]
    fn test_lower_task_reference() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("T", 2)).unwrap();
        let mut ctx = EncoderCtx::new(&p);
        ctx.declare_int("horizon");
        encode_tasks(&mut ctx);
        let term = lower_bool_expr(
            &ctx,
            "test",
            &task_end("T").eq(task_start("T").plus(IntExpr::Const(2))),
        )
        .unwrap();
        let printed = term.to_smtlib();
        assert!(printed.contains("_start"));
        assert!(printed.contains("_end"));
    }

    #[test]
    fn test_unknown_task_reference() {
        let p = Problem::with_horizon("p", 10);
        let ctx = EncoderCtx::new(&p);
        let err = lower_int_expr(&ctx, "test", &task_start("ghost")).unwrap_err();
        assert!(matches!(err, EncodeError::UnknownReference { kind: "task", .. }));
    }

    #[test]
    fn test_unknown_indicator_reference() {
        let p = Problem::with_horizon("p", 10);
        let ctx = EncoderCtx::new(&p);
        let err =
            lower_int_expr(&ctx, "test", &IntExpr::Indicator("missing".into())).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::UnknownReference { kind: "indicator", .. }
        ));
    }
}
