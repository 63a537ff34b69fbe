//! Value codec tests: scalars, nullables, collections, data objects and
//! remote references.

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{Color, Int, IntCap, LabCap, Point, Segment};
use tws_protocol::{Address, ErrorKind, TypeClass, TypeDesc};
use tws_runtime::{Endpoint, InterfaceRegistry, Proxy, WireType, ty};
use tws_transport::LoopbackTransport;

fn cx() -> Endpoint {
    Endpoint::client(InterfaceRegistry::new(), Arc::new(LoopbackTransport::new()))
}

fn roundtrip<T: WireType + PartialEq + std::fmt::Debug>(value: T) {
    let cx = cx();
    let text = value.encode(&cx).unwrap();
    assert_eq!(T::decode(&text, &cx).unwrap(), value, "via {text:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_use_invariant_text() {
        let cx = cx();
        assert_eq!((-42i32).encode(&cx).unwrap(), "-42");
        assert_eq!(1.5f64.encode(&cx).unwrap(), "1.5");
        assert_eq!(true.encode(&cx).unwrap(), "true");
        assert_eq!(().encode(&cx).unwrap(), "");

        roundtrip(u64::MAX);
        roundtrip(i8::MIN);
        roundtrip(0.25f32);
        roundtrip("plain text".to_string());
    }

    #[test]
    fn malformed_scalars_are_format_errors() {
        let cx = cx();
        assert_eq!(i32::decode("12a", &cx).unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(u8::decode("256", &cx).unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(bool::decode("yes", &cx).unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(<()>::decode("x", &cx).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn bool_decodes_case_insensitively() {
        let cx = cx();
        assert!(bool::decode("True", &cx).unwrap());
        assert!(!bool::decode("FALSE", &cx).unwrap());
    }

    #[test]
    fn empty_string_is_null_for_nullables_only() {
        let cx = cx();
        assert_eq!(String::decode("", &cx).unwrap(), "");
        assert_eq!(Option::<String>::decode("", &cx).unwrap(), None);
        assert_eq!(Option::<i32>::decode("", &cx).unwrap(), None);
        assert_eq!(Option::<i32>::decode("7", &cx).unwrap(), Some(7));

        assert_eq!(None::<String>.encode(&cx).unwrap(), "");
        // Some("") and None share the empty wire string.
        assert_eq!(Some(String::new()).encode(&cx).unwrap(), "");
        assert_eq!(
            Option::<String>::decode(&Some(String::new()).encode(&cx).unwrap(), &cx).unwrap(),
            None
        );
    }

    #[test]
    fn collections_are_bracketed_and_ordered() {
        let cx = cx();
        assert_eq!(vec![1, 2, 3].encode(&cx).unwrap(), "[1,2,3]");
        assert_eq!(Vec::<i32>::new().encode(&cx).unwrap(), "[]");
        assert_eq!(Vec::<i32>::decode("[]", &cx).unwrap(), Vec::<i32>::new());
        assert_eq!(Vec::<i32>::decode("", &cx).unwrap(), Vec::<i32>::new());
        assert_eq!(Option::<Vec<i32>>::decode("", &cx).unwrap(), None);
        assert_eq!(Option::<Vec<i32>>::decode("[]", &cx).unwrap(), Some(vec![]));

        roundtrip(vec![3, 1, 2, 1]);
        roundtrip(vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn collection_elements_are_escaped() {
        let cx = cx();
        let items = vec!["a,b".to_string(), "[x]".to_string(), "back\\slash".to_string()];
        assert_eq!(items.encode(&cx).unwrap(), r"[a\,b,\[x\],back\\slash]");
        roundtrip(items);

        let nested = vec![vec![1, 2], vec![3]];
        assert_eq!(nested.encode(&cx).unwrap(), r"[\[1\,2\],\[3\]]");
        roundtrip(nested);
    }

    #[test]
    fn single_empty_element_keeps_its_count() {
        let cx = cx();
        let text = vec![String::new()].encode(&cx).unwrap();
        assert_eq!(text, r"[\]");
        assert_eq!(Vec::<String>::decode(&text, &cx).unwrap(), vec![String::new()]);
        assert_ne!(text, Vec::<String>::new().encode(&cx).unwrap());

        roundtrip(vec![None::<i32>]);
        roundtrip(vec![String::new(), String::new()]);
        roundtrip(vec![vec![String::new()]]);
        roundtrip(vec![vec![String::new()], vec![]]);
        // An escaped backslash is not the empty marker.
        roundtrip(vec!["\\".to_string()]);
    }

    #[test]
    fn malformed_collections_are_format_errors() {
        let cx = cx();
        let err = Vec::<i32>::decode("1,2", &cx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        let err = Vec::<String>::decode(r"[a\]", &cx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn durations_travel_as_milliseconds() {
        let cx = cx();
        assert_eq!(Duration::from_millis(1500).encode(&cx).unwrap(), "1500");
        assert_eq!(
            Duration::decode("250", &cx).unwrap(),
            Duration::from_millis(250)
        );
        assert!(matches!(Duration::describe(), TypeDesc::Custom { .. }));
    }

    #[test]
    fn enums_use_symbolic_names() {
        let cx = cx();
        assert_eq!(Color::Green.encode(&cx).unwrap(), "Green");
        assert_eq!(Color::decode("green", &cx).unwrap(), Color::Green);
        assert_eq!(Color::decode("Blue", &cx).unwrap_err().kind(), ErrorKind::Format);
        match Color::describe() {
            TypeDesc::Enum { name, variants } => {
                assert_eq!(name, "Color");
                assert_eq!(variants, vec!["Red".to_string(), "Green".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn data_objects_are_field_maps() {
        let cx = cx();
        let text = Point { x: 1, y: -2 }.encode(&cx).unwrap();
        assert_eq!(text, r#"{"x":1,"y":-2}"#);

        roundtrip(Segment {
            from: Point { x: 0, y: 0 },
            to: Point { x: 3, y: 4 },
            label: "a, [b]".into(),
        });
        roundtrip(vec![Point { x: 1, y: 1 }, Point { x: 2, y: 2 }]);

        let err = Point::decode("{\"x\":1}", &cx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn type_descriptions_classify() {
        assert_eq!(ty::<i32>().class(), TypeClass::DataValue);
        assert_eq!(ty::<Option<Vec<i32>>>().class(), TypeClass::Nullable);
        assert_eq!(ty::<Vec<Option<String>>>().class(), TypeClass::Collection);
        assert_eq!(ty::<Arc<Int>>().class(), TypeClass::RemoteReference);
        assert_eq!(ty::<Option<Proxy<IntCap>>>().class(), TypeClass::RemoteReference);
        assert_eq!(ty::<Option<Option<i32>>>().class(), TypeClass::Unsupported);
        assert_eq!(ty::<Vec<Proxy<IntCap>>>().class(), TypeClass::Unsupported);
    }

    #[test]
    fn local_objects_need_a_hosting_endpoint() {
        let err = Int::new(1).encode(&cx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn proxies_pass_their_address_through() {
        let cx = cx();
        let address = Address::parse("loopback://elsewhere~abc123").unwrap();
        let proxy = Proxy::<IntCap>::bind(&cx, address.clone());
        assert_eq!(proxy.encode(&cx).unwrap(), "loopback://elsewhere~abc123");

        let decoded = Proxy::<IntCap>::decode("loopback://elsewhere~abc123", &cx).unwrap();
        assert_eq!(decoded.address(), &address);
        assert_eq!(decoded.path_prefix(), "");

        // Property stubs travel as their parent's address extended by the path.
        let lab = Proxy::<LabCap>::bind(&cx, address);
        let child = lab.child::<IntCap>("Int").unwrap();
        let text = child.encode(&cx).unwrap();
        assert_eq!(text, "loopback://elsewhere/Int~abc123");
        let decoded = Proxy::<IntCap>::decode(&text, &cx).unwrap();
        assert_eq!(decoded.address().endpoint(), "loopback://elsewhere/Int");
        assert_eq!(decoded.address().instance_id(), Some("abc123"));
    }

    #[test]
    fn null_references_decode_only_as_nullable() {
        let cx = cx();
        assert_eq!(
            Proxy::<IntCap>::decode("", &cx).unwrap_err().kind(),
            ErrorKind::Format
        );
        assert!(Option::<Proxy<IntCap>>::decode("", &cx).unwrap().is_none());
    }
}
