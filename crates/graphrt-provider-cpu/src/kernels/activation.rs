use graphrt::error::{Result, RuntimeError};
use graphrt::kernel::{KernelRegistry, OpKernel, OpKernelContext, OpKernelInfo};

use super::{float_kernel, KernelRegistrar, CPU_KERNEL_REGISTRARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
    Reciprocal,
}

impl UnaryOp {
    const ALL: [(&'static str, UnaryOp); 4] = [
        ("Relu", UnaryOp::Relu),
        ("Sigmoid", UnaryOp::Sigmoid),
        ("Tanh", UnaryOp::Tanh),
        ("Reciprocal", UnaryOp::Reciprocal),
    ];

    fn from_op_type(op_type: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|(name, _)| *name == op_type)
            .map(|(_, op)| *op)
            .ok_or_else(|| RuntimeError::usage(format!("{op_type} is not a unary operator")))
    }

    fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => sigmoid(x),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Reciprocal => 1.0 / x,
        }
    }
}

/// Logistic function evaluated on `-|x|` so `exp` never overflows.
fn sigmoid(x: f32) -> f32 {
    let y = 1.0 / (1.0 + (-x.abs()).exp());
    if x > 0.0 {
        y
    } else {
        1.0 - y
    }
}

struct UnaryKernel {
    op: UnaryOp,
}

impl OpKernel for UnaryKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        let out = ctx.output(0, x.shape().clone())?;
        for (dst, src) in out.data_mut::<f32>()?.iter_mut().zip(x.data::<f32>()?) {
            *dst = self.op.apply(*src);
        }
        Ok(())
    }
}

/// Clamps every element to `[min, max]`.
struct ClipKernel {
    min: f32,
    max: f32,
}

impl OpKernel for ClipKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        let out = ctx.output(0, x.shape().clone())?;
        for (dst, src) in out.data_mut::<f32>()?.iter_mut().zip(x.data::<f32>()?) {
            *dst = src.max(self.min).min(self.max);
        }
        Ok(())
    }
}

fn create_unary(info: &OpKernelInfo) -> Result<Box<dyn OpKernel>> {
    Ok(Box::new(UnaryKernel {
        op: UnaryOp::from_op_type(info.op_type())?,
    }))
}

fn create_clip(info: &OpKernelInfo) -> Result<Box<dyn OpKernel>> {
    let min = info.attr_or("min", f32::MIN)?;
    let max = info.attr_or("max", f32::MAX)?;
    if min > max {
        return Err(RuntimeError::InvalidAttribute {
            name: "min".to_string(),
            detail: format!("min {min} exceeds max {max}"),
        });
    }
    Ok(Box::new(ClipKernel { min, max }))
}

fn register(registry: &mut KernelRegistry, provider_type: &str) -> Result<()> {
    for (op_type, _) in UnaryOp::ALL {
        registry.register(float_kernel(op_type, provider_type).build(), create_unary)?;
    }
    registry.register(float_kernel("Clip", provider_type).build(), create_clip)?;
    Ok(())
}

#[linkme::distributed_slice(CPU_KERNEL_REGISTRARS)]
static REGISTER_ACTIVATIONS: KernelRegistrar = register;
