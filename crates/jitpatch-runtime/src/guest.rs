//! Guest lifecycle driver: strings, `Execute` and `CallFunctionByName`.

use jitpatch_types::abi;
use jitpatch_types::{HarnessError, HarnessResult};
use wasmi::{Instance, Store, TypedFunc, WasmParams, WasmResults};

use crate::context::ExecutionContext;
use crate::wasi::HostState;

/// Typed handles to the guest's exported functions.
pub(crate) struct GuestExports {
    pub initialize: TypedFunc<(), ()>,
    pub initialize_sm: TypedFunc<i32, ()>,
    pub shut_down_sm: TypedFunc<(), ()>,
    pub execute: TypedFunc<i32, ()>,
    pub call_function_by_name: TypedFunc<(i32, i32, i32), f64>,
    pub allocate_bytes: TypedFunc<i32, i32>,
    pub free_bytes: TypedFunc<i32, ()>,
    pub jit_module: TypedFunc<(), i32>,
    pub module_data: TypedFunc<i32, i32>,
    pub module_size: TypedFunc<i32, i32>,
    pub free_module: TypedFunc<i32, ()>,
}

fn typed<P: WasmParams, R: WasmResults>(
    instance: &Instance,
    store: &Store<HostState>,
    name: &str,
) -> HarnessResult<TypedFunc<P, R>> {
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|e| HarnessError::Link(format!("guest export `{name}`: {e}")))
}

impl GuestExports {
    pub fn resolve(instance: &Instance, store: &Store<HostState>) -> HarnessResult<Self> {
        Ok(Self {
            initialize: typed(instance, store, abi::EXPORT_INITIALIZE)?,
            initialize_sm: typed(instance, store, abi::EXPORT_INITIALIZE_SM)?,
            shut_down_sm: typed(instance, store, abi::EXPORT_SHUT_DOWN_SM)?,
            execute: typed(instance, store, abi::EXPORT_EXECUTE)?,
            call_function_by_name: typed(instance, store, abi::EXPORT_CALL_FUNCTION_BY_NAME)?,
            allocate_bytes: typed(instance, store, abi::EXPORT_ALLOCATE_BYTES)?,
            free_bytes: typed(instance, store, abi::EXPORT_FREE_BYTES)?,
            jit_module: typed(instance, store, abi::EXPORT_JIT_MODULE)?,
            module_data: typed(instance, store, abi::EXPORT_MODULE_DATA)?,
            module_size: typed(instance, store, abi::EXPORT_MODULE_SIZE)?,
            free_module: typed(instance, store, abi::EXPORT_FREE_MODULE)?,
        })
    }
}

/// A NUL-terminated UTF-8 string owned by the guest allocator.
///
/// Not `Clone`: [`ExecutionContext::free_string`] consumes it, so a string
/// cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "guest strings must be released with `free_string`"]
pub struct GuestString {
    address: u32,
    len: usize,
}

impl GuestString {
    /// Guest address of the first byte.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Length in bytes, without the trailing NUL.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn as_arg(&self) -> i32 {
        self.address as i32
    }
}

impl ExecutionContext {
    /// Copy `text` plus a trailing NUL into a fresh guest allocation.
    pub fn write_string(&mut self, text: &str) -> HarnessResult<GuestString> {
        let requested = text.len() + 1;
        let size = i32::try_from(requested).map_err(|_| HarnessError::Allocation { requested })?;
        let address = self
            .exports
            .allocate_bytes
            .call(&mut self.store, size)
            .map_err(|e| HarnessError::trap(abi::EXPORT_ALLOCATE_BYTES, e))?;
        if address == 0 {
            return Err(HarnessError::Allocation { requested });
        }

        let mut bytes = Vec::with_capacity(requested);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        self.memory
            .write(&mut self.store, address as u32 as usize, &bytes)
            .map_err(|_| {
                HarnessError::Protocol(format!(
                    "{} returned {:#x}, but {requested} bytes there fall outside memory",
                    abi::EXPORT_ALLOCATE_BYTES,
                    address as u32
                ))
            })?;

        Ok(GuestString {
            address: address as u32,
            len: text.len(),
        })
    }

    /// Release a string through `FreeBytes`.
    pub fn free_string(&mut self, string: GuestString) -> HarnessResult<()> {
        self.exports
            .free_bytes
            .call(&mut self.store, string.as_arg())
            .map_err(|e| HarnessError::trap(abi::EXPORT_FREE_BYTES, e))
    }

    /// Write `text`, run `f` with it, then release it whether or not `f`
    /// succeeded. A release failure after a failed `f` is only logged.
    pub fn with_string<T>(
        &mut self,
        text: &str,
        f: impl FnOnce(&mut Self, &GuestString) -> HarnessResult<T>,
    ) -> HarnessResult<T> {
        let string = self.write_string(text)?;
        let result = f(self, &string);
        match (result, self.free_string(string)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                log::warn!("releasing guest string failed after an earlier error: {cleanup}");
                Err(e)
            }
        }
    }

    /// Hand `source` to the guest's `Execute`.
    pub fn execute(&mut self, source: &GuestString) -> HarnessResult<()> {
        self.exports
            .execute
            .call(&mut self.store, source.as_arg())
            .map_err(|e| HarnessError::trap(abi::EXPORT_EXECUTE, e))
    }

    /// Call the guest function `name`; returns the guest-measured time in ms.
    pub fn call_function_by_name(&mut self, name: &GuestString) -> HarnessResult<f64> {
        self.exports
            .call_function_by_name
            .call(&mut self.store, (name.as_arg(), 1, 1))
            .map_err(|e| HarnessError::trap(abi::EXPORT_CALL_FUNCTION_BY_NAME, e))
    }
}
