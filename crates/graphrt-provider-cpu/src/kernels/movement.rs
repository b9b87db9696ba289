use graphrt::error::{Result, RuntimeError};
use graphrt::kernel::{KernelRegistry, OpKernel, OpKernelContext, OpKernelInfo};
use graphrt::tensor::copy_tensor_data;
use graphrt::Shape;

use super::{float_kernel, KernelRegistrar, CPU_KERNEL_REGISTRARS};

struct IdentityKernel;

impl OpKernel for IdentityKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        let out = ctx.output(0, x.shape().clone())?;
        copy_tensor_data(&x, out)
    }
}

/// Extracts a box from the input along the listed axes.
///
/// Negative starts and ends count from the back of the axis. An end of `-1` means "through the
/// last element", matching what redundant-slice elimination assumes. Both bounds are clamped to
/// the axis.
#[derive(Debug)]
struct SliceKernel {
    starts: Vec<i64>,
    ends: Vec<i64>,
    axes: Option<Vec<i64>>,
}

impl SliceKernel {
    /// Per-axis `[begin, end)` ranges over `dims`.
    fn ranges(&self, dims: &[usize]) -> Result<Vec<(usize, usize)>> {
        let rank = dims.len();
        let mut ranges: Vec<(usize, usize)> = dims.iter().map(|&dim| (0, dim)).collect();
        let axes: Vec<i64> = match &self.axes {
            Some(axes) => axes.clone(),
            None => (0..self.starts.len() as i64).collect(),
        };
        for ((&axis, &start), &end) in axes.iter().zip(&self.starts).zip(&self.ends) {
            let resolved = if axis < 0 { axis + rank as i64 } else { axis };
            if resolved < 0 || resolved >= rank as i64 {
                return Err(RuntimeError::InvalidAttribute {
                    name: "axes".to_string(),
                    detail: format!("axis {axis} is out of range for rank {rank}"),
                });
            }
            let axis = resolved as usize;
            let dim = dims[axis] as i64;
            let begin = clamp_index(start, dim);
            let stop = if end == -1 { dim } else { clamp_index(end, dim) };
            ranges[axis] = (begin as usize, stop.max(begin) as usize);
        }
        Ok(ranges)
    }
}

fn clamp_index(index: i64, dim: i64) -> i64 {
    let index = if index < 0 { index.saturating_add(dim) } else { index };
    index.clamp(0, dim)
}

impl OpKernel for SliceKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        let dims = x.shape().dims();
        let ranges = self.ranges(dims)?;
        let out_dims: Vec<usize> = ranges.iter().map(|(begin, end)| end - begin).collect();
        let out_shape = Shape::new(&out_dims);
        let in_strides = x.shape().strides();

        let src = x.data::<f32>()?;
        let out = ctx.output(0, out_shape)?;
        for (linear, dst) in out.data_mut::<f32>()?.iter_mut().enumerate() {
            let mut remaining = linear;
            let mut offset = 0;
            for axis in (0..out_dims.len()).rev() {
                let coord = remaining % out_dims[axis];
                remaining /= out_dims[axis];
                offset += (ranges[axis].0 + coord) * in_strides[axis];
            }
            *dst = src[offset];
        }
        Ok(())
    }
}

fn create_slice(info: &OpKernelInfo) -> Result<Box<dyn OpKernel>> {
    let starts: Vec<i64> = info.attr("starts")?;
    let ends: Vec<i64> = info.attr("ends")?;
    let axes: Option<Vec<i64>> = info.node().typed_attribute("axes")?;
    let expected = axes.as_ref().map_or(starts.len(), Vec::len);
    if starts.len() != ends.len() || starts.len() != expected {
        return Err(RuntimeError::InvalidAttribute {
            name: "starts".to_string(),
            detail: format!(
                "node '{}' has {} starts, {} ends and {expected} axes",
                info.node_name(),
                starts.len(),
                ends.len()
            ),
        });
    }
    Ok(Box::new(SliceKernel { starts, ends, axes }))
}

fn register(registry: &mut KernelRegistry, provider_type: &str) -> Result<()> {
    registry.register(float_kernel("Identity", provider_type).build(), |_| {
        Ok(Box::new(IdentityKernel))
    })?;
    registry.register(float_kernel("Slice", provider_type).build(), create_slice)?;
    Ok(())
}

#[linkme::distributed_slice(CPU_KERNEL_REGISTRARS)]
static REGISTER_MOVEMENT: KernelRegistrar = register;
