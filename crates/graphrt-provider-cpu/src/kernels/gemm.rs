use graphrt::error::{Result, RuntimeError};
use graphrt::kernel::broadcast::broadcast_index;
use graphrt::kernel::{KernelRegistry, OpKernel, OpKernelContext, OpKernelInfo};
use graphrt::Shape;

use super::{float_kernel, KernelRegistrar, CPU_KERNEL_REGISTRARS};

/// `Y = alpha * op(A) * op(B) + beta * C`, where `op` optionally transposes.
///
/// `C` broadcasts unidirectionally to `[M, N]`. With `beta == 0` neither `C` nor the previous
/// contents of `Y` are read, so stale or NaN output memory never leaks into the result.
#[derive(Debug)]
struct GemmKernel {
    trans_a: bool,
    trans_b: bool,
    alpha: f32,
    beta: f32,
}

impl GemmKernel {
    fn matrix_dims(shape: &Shape, transposed: bool, what: &str) -> Result<(usize, usize)> {
        match shape.dims() {
            [rows, cols] if transposed => Ok((*cols, *rows)),
            [rows, cols] => Ok((*rows, *cols)),
            _ => Err(RuntimeError::shape_mismatch(format!(
                "Gemm {what} must be 2-D, got {shape}"
            ))),
        }
    }
}

impl OpKernel for GemmKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let a = ctx.input(0)?;
        let b = ctx.input(1)?;
        let c = if self.beta != 0.0 {
            ctx.optional_input(2)
        } else {
            None
        };

        let (m, k) = Self::matrix_dims(a.shape(), self.trans_a, "A")?;
        let (k_b, n) = Self::matrix_dims(b.shape(), self.trans_b, "B")?;
        if k != k_b {
            return Err(RuntimeError::shape_mismatch(format!(
                "Gemm inner dimensions differ: A gives {k}, B gives {k_b}"
            )));
        }
        let out_shape = Shape::new([m, n]);
        if let Some(c) = &c {
            if !c.shape().broadcasts_to(&out_shape) {
                return Err(RuntimeError::shape_mismatch(format!(
                    "Gemm C of shape {} does not broadcast to {out_shape}",
                    c.shape()
                )));
            }
        }

        let (a_data, b_data) = (a.data::<f32>()?, b.data::<f32>()?);
        let (a_cols, b_cols) = (a.shape().dims()[1], b.shape().dims()[1]);
        let a_at = |row: usize, col: usize| {
            if self.trans_a {
                a_data[col * a_cols + row]
            } else {
                a_data[row * a_cols + col]
            }
        };
        let b_at = |row: usize, col: usize| {
            if self.trans_b {
                b_data[col * b_cols + row]
            } else {
                b_data[row * b_cols + col]
            }
        };

        let bias = match &c {
            Some(c) => Some((c.data::<f32>()?, c.shape())),
            None => None,
        };
        let out = ctx.output(0, out_shape.clone())?;
        let y = out.data_mut::<f32>()?;
        for row in 0..m {
            for col in 0..n {
                let mut acc = 0.0f32;
                for inner in 0..k {
                    acc += a_at(row, inner) * b_at(inner, col);
                }
                let linear = row * n + col;
                let mut value = self.alpha * acc;
                if let Some((c_data, c_shape)) = bias {
                    value += self.beta * c_data[broadcast_index(linear, &out_shape, c_shape)];
                }
                y[linear] = value;
            }
        }
        Ok(())
    }
}

fn create_gemm(info: &OpKernelInfo) -> Result<Box<dyn OpKernel>> {
    Ok(Box::new(GemmKernel {
        trans_a: info.attr_or("transA", false)?,
        trans_b: info.attr_or("transB", false)?,
        alpha: info.attr_or("alpha", 1.0f32)?,
        beta: info.attr_or("beta", 1.0f32)?,
    }))
}

fn register(registry: &mut KernelRegistry, provider_type: &str) -> Result<()> {
    registry.register(float_kernel("Gemm", provider_type).build(), create_gemm)
}

#[linkme::distributed_slice(CPU_KERNEL_REGISTRARS)]
static REGISTER_GEMM: KernelRegistrar = register;
