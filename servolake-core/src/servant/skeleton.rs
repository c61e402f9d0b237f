//! Operations every object answers regardless of its type.
use super::Dispatched;
use crate::{
    dispatch::DispatchContext, fault::DispatchFault, request::RequestDescriptor,
    status::DispatchStatus,
};

pub const OBJECT_TYPE_ID: &str = "::Ice::Object";

/// Handle `ice_ping`, `ice_isA`, `ice_id` and `ice_ids`.
///
/// `type_ids` lists every type the servant implements, `type_id` being the most derived.
/// Any other operation is answered with `OperationNotExist`.
pub fn dispatch_builtin(
    type_id: &str,
    type_ids: &[&str],
    current: &RequestDescriptor,
    ctx: &mut DispatchContext,
) -> Result<Dispatched, DispatchFault> {
    match current.operation.as_str() {
        "ice_ping" => {}
        "ice_isA" => {
            let candidate = ctx.istr().read_string()?;
            let is_a = candidate == type_id
                || candidate == OBJECT_TYPE_ID
                || type_ids.contains(&candidate.as_str());
            ctx.ostr().write_bool(is_a);
        }
        "ice_id" => ctx.ostr().write_string(type_id),
        "ice_ids" => {
            let mut ids: Vec<&str> = type_ids.to_vec();
            ids.extend([type_id, OBJECT_TYPE_ID]);
            ids.sort_unstable();
            ids.dedup();
            ctx.ostr().write_string_seq(&ids);
        }
        _ => return Err(DispatchFault::operation_not_exist()),
    }
    Ok(Dispatched::Completed(DispatchStatus::Ok))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{identity::Identity, wire::WireStream};

    fn run(operation: &str, args: impl FnOnce(&mut WireStream)) -> (Result<Dispatched, DispatchFault>, WireStream) {
        let mut ctx = DispatchContext::new(0);
        let mut body = WireStream::new();
        args(&mut body);
        ctx.reset(body.as_bytes(), None);
        let current = RequestDescriptor::new(Identity::named("x"), operation);
        let result = dispatch_builtin("::Demo::Hello", &["::Demo::Greeter"], &current, &mut ctx);
        let out = WireStream::from_bytes(ctx.ostr().as_bytes());
        (result, out)
    }

    #[test]
    fn test_ping_and_id() {
        let (result, out) = run("ice_ping", |_| {});
        assert_eq!(result, Ok(Dispatched::Completed(DispatchStatus::Ok)));
        assert!(out.is_empty());

        let (_, mut out) = run("ice_id", |_| {});
        assert_eq!(out.read_string().unwrap(), "::Demo::Hello");
    }

    #[test]
    fn test_is_a() {
        let (_, mut out) = run("ice_isA", |os| os.write_string("::Demo::Greeter"));
        assert!(out.read_bool().unwrap());
        let (_, mut out) = run("ice_isA", |os| os.write_string("::Ice::Object"));
        assert!(out.read_bool().unwrap());
        let (_, mut out) = run("ice_isA", |os| os.write_string("::Other"));
        assert!(!out.read_bool().unwrap());

        let (result, _) = run("ice_isA", |_| {});
        assert!(matches!(result, Err(DispatchFault::Local(_))));
    }

    #[test]
    fn test_ids_are_sorted() {
        let (_, mut out) = run("ice_ids", |_| {});
        assert_eq!(
            out.read_string_seq().unwrap(),
            vec!["::Demo::Greeter", "::Demo::Hello", "::Ice::Object"]
        );
    }

    #[test]
    fn test_unknown_operation() {
        let (result, _) = run("frobnicate", |_| {});
        assert_eq!(result, Err(DispatchFault::operation_not_exist()));
    }
}
