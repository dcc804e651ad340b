//! Memory access opcodes: READ/WRITE for pool slots and their remote
//! variants RREAD/RWRITE for externally-bound variables. The remote
//! names are compiler-internal; the compiler rejects them in input text.

use rtexpr_vm::{ExecCtx, FunctionRecord, FunctionRegistry, Scalar};

use crate::scalar;

fn read_op<T: Scalar>(ctx: &mut ExecCtx) {
    let addr = ctx.next_code();
    let value: T = ctx.load(addr);
    ctx.push(value);
}

fn write_op<T: Scalar>(ctx: &mut ExecCtx) {
    let addr = ctx.next_code();
    let value: T = ctx.pop();
    ctx.store(addr, value);
}

fn register_access<T: Scalar>(registry: &mut FunctionRegistry, name: &'static str, load: bool) {
    let t = scalar(T::KIND);
    let record = if load {
        FunctionRecord::new(name, 0, 1, &[t], read_op::<T>)
    } else {
        // destination type kept at index `inputs` for output matching
        FunctionRecord::new(name, 1, 0, &[t, t], write_op::<T>)
    };
    registry.register(record.with_operands(1));
}

macro_rules! for_each_kind {
    ($call:ident, $registry:ident, $name:literal, $load:literal) => {
        $call::<i8>($registry, $name, $load);
        $call::<i16>($registry, $name, $load);
        $call::<i32>($registry, $name, $load);
        $call::<i64>($registry, $name, $load);
        $call::<u8>($registry, $name, $load);
        $call::<u16>($registry, $name, $load);
        $call::<u32>($registry, $name, $load);
        $call::<u64>($registry, $name, $load);
        $call::<f32>($registry, $name, $load);
        $call::<f64>($registry, $name, $load);
    };
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    for_each_kind!(register_access, registry, "READ", true);
    for_each_kind!(register_access, registry, "WRITE", false);
    // remote variants share the executors; the memory pool indirects
    // through the bound pointer based on the slot's storage
    for_each_kind!(register_access, registry, "RREAD", true);
    for_each_kind!(register_access, registry, "RWRITE", false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtexpr_core::ScalarKind;
    use rtexpr_vm::{DataMemory, EvalStack};

    #[test]
    fn read_pushes_slot_value() {
        let mut memory = DataMemory::new();
        let addr = memory.alloc_scalar(ScalarKind::Float64);
        memory.write_scalar(addr, 2.75f64).unwrap();
        let mut stack = EvalStack::new();
        stack.resize(2);

        let code = [addr];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        read_op::<f64>(&mut ctx);
        assert!(ctx.ok());
        assert_eq!(ctx.pop::<f64>(), 2.75);
    }

    #[test]
    fn write_pops_into_slot() {
        let mut memory = DataMemory::new();
        let addr = memory.alloc_scalar(ScalarKind::Int16);
        let mut stack = EvalStack::new();
        stack.resize(1);
        stack.push(-123i16);

        let code = [addr];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        write_op::<i16>(&mut ctx);
        assert!(ctx.ok());
        assert_eq!(memory.read_scalar::<i16>(addr).unwrap(), -123);
    }

    #[test]
    fn remote_write_through_pointer() {
        let mut target = 0u32;
        let mut memory = DataMemory::new();
        let addr = memory.bind_scalar(ScalarKind::Uint32, (&mut target as *mut u32).cast());
        let mut stack = EvalStack::new();
        stack.resize(1);
        stack.push(99u32);

        let code = [addr];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        write_op::<u32>(&mut ctx);
        assert!(ctx.ok());
        drop(ctx);
        drop(memory);
        assert_eq!(target, 99);
    }
}
