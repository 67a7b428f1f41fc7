use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use weave_invocation::category::UNCHECKED;
use weave_invocation::{Fault, Interceptor, InvocationError, OperationDescriptor, Target, TypeDescriptor, Value, interceptor_fn};

use crate::{Advisor, Selector};

pub(crate) type Log = Arc<Mutex<Vec<String>>>;

pub(crate) fn log() -> Log {
	Arc::new(Mutex::new(Vec::new()))
}

/// Stock counter exposing a handful of operations.
pub(crate) struct Inventory {
	ty: TypeDescriptor,
	stock: AtomicI64,
}

impl Inventory {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self {
			ty: inventory_type(),
			stock: AtomicI64::new(0),
		})
	}

	pub(crate) fn stock(&self) -> i64 {
		self.stock.load(Ordering::SeqCst)
	}
}

pub(crate) fn inventory_type() -> TypeDescriptor {
	TypeDescriptor::new("Inventory")
		.implements("Stock")
		.operation(OperationDescriptor::new("Stock", "restock").param("i64").returns("i64"))
		.operation(OperationDescriptor::new("Stock", "count").returns("i64"))
		.operation(OperationDescriptor::new("Stock", "itself").returns("Stock"))
		.operation(OperationDescriptor::new("Stock", "explode"))
}

impl Target for Inventory {
	fn type_descriptor(&self) -> &TypeDescriptor {
		&self.ty
	}

	fn dispatch(self: Arc<Self>, operation: &OperationDescriptor, args: &[Value]) -> Result<Value, InvocationError> {
		match operation.name() {
			"restock" => {
				let amount = args[0].downcast_ref::<i64>().copied().unwrap_or_default();
				Ok(Value::new(self.stock.fetch_add(amount, Ordering::SeqCst) + amount))
			}
			"count" => Ok(Value::new(self.stock())),
			"itself" => Ok(Value::from_arc(self)),
			"explode" => Err(Fault::new(&UNCHECKED, "boom").into()),
			other => Err(InvocationError::UnknownOperation {
				type_name: "Inventory".into(),
				operation: other.into(),
			}),
		}
	}
}

/// Interceptor logging "+name" on entry and "-name" on exit.
pub(crate) fn recording(name: &'static str, log: &Log) -> Arc<dyn Interceptor> {
	let log = Arc::clone(log);
	Arc::new(interceptor_fn(name, move |inv| {
		log.lock().push(format!("+{name}"));
		let result = inv.proceed();
		log.lock().push(format!("-{name}"));
		result
	}))
}

/// Advisor applying to every operation, recording into `log`.
pub(crate) fn recording_advisor(name: &'static str, log: &Log) -> Advisor {
	Advisor::new(name, Selector::any(), recording(name, log))
}

pub(crate) fn op(ty: &TypeDescriptor, name: &str) -> Arc<OperationDescriptor> {
	ty.operations()
		.iter()
		.find(|op| op.name() == name)
		.cloned()
		.unwrap_or_else(|| panic!("no operation {name}"))
}
