use graphrt::error::{Result, RuntimeError};
use graphrt::kernel::broadcast::BroadcastPlan;
use graphrt::kernel::{KernelRegistry, OpKernel, OpKernelContext, OpKernelInfo};

use super::{float_kernel, KernelRegistrar, CPU_KERNEL_REGISTRARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    const ALL: [(&'static str, BinaryOp); 4] = [
        ("Add", BinaryOp::Add),
        ("Sub", BinaryOp::Sub),
        ("Mul", BinaryOp::Mul),
        ("Div", BinaryOp::Div),
    ];

    fn from_op_type(op_type: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|(name, _)| *name == op_type)
            .map(|(_, op)| *op)
            .ok_or_else(|| RuntimeError::usage(format!("{op_type} is not a binary operator")))
    }

    fn apply(self, lhs: f32, rhs: f32) -> f32 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
        }
    }
}

/// Binary arithmetic with multidirectional broadcasting.
struct BinaryKernel {
    op: BinaryOp,
}

impl OpKernel for BinaryKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let lhs = ctx.input(0)?;
        let rhs = ctx.input(1)?;
        let plan = BroadcastPlan::new(&[lhs.shape(), rhs.shape()])?;
        let (a, b) = (lhs.data::<f32>()?, rhs.data::<f32>()?);
        let out = ctx.output(0, plan.output_shape().clone())?;
        for (i, value) in out.data_mut::<f32>()?.iter_mut().enumerate() {
            *value = self.op.apply(a[plan.source_index(0, i)], b[plan.source_index(1, i)]);
        }
        Ok(())
    }
}

/// Element-wise sum of any number of same-shaped inputs.
struct SumKernel;

impl OpKernel for SumKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let first = ctx.input(0)?;
        let rest = (1..ctx.input_count())
            .map(|index| ctx.input(index))
            .collect::<Result<Vec<_>>>()?;
        for (index, input) in rest.iter().enumerate() {
            if input.shape() != first.shape() {
                return Err(RuntimeError::shape_mismatch(format!(
                    "Sum input {} has shape {} but input 0 has {}",
                    index + 1,
                    input.shape(),
                    first.shape()
                )));
            }
        }

        let out = ctx.output(0, first.shape().clone())?;
        let acc = out.data_mut::<f32>()?;
        acc.copy_from_slice(first.data::<f32>()?);
        for input in &rest {
            for (dst, src) in acc.iter_mut().zip(input.data::<f32>()?) {
                *dst += src;
            }
        }
        Ok(())
    }
}

fn create_binary(info: &OpKernelInfo) -> Result<Box<dyn OpKernel>> {
    Ok(Box::new(BinaryKernel {
        op: BinaryOp::from_op_type(info.op_type())?,
    }))
}

fn register(registry: &mut KernelRegistry, provider_type: &str) -> Result<()> {
    for (op_type, _) in BinaryOp::ALL {
        registry.register(
            float_kernel(op_type, provider_type)
                .broadcast_inputs()
                .build(),
            create_binary,
        )?;
    }
    registry.register(float_kernel("Sum", provider_type).build(), |_| {
        Ok(Box::new(SumKernel))
    })?;
    Ok(())
}

#[linkme::distributed_slice(CPU_KERNEL_REGISTRARS)]
static REGISTER_ELEMENTWISE: KernelRegistrar = register;
