use std::sync::Arc;

use verifier_classfile::ClassFile;
use verifier_resolver::{jars_resolver, ReadMode, Resolver};
use verifier_test_utils::{ClassBuilder, JarBuilder};

fn class(name: &str) -> ClassFile {
    ClassFile::parse(&ClassBuilder::new(name).build()).unwrap()
}

#[test]
fn cached_empty_resolver_has_nothing() {
    let resolver = Resolver::cached(Arc::new(Resolver::Empty));
    assert!(resolver.find_class("a").unwrap().is_none());
    assert!(resolver.all_classes().is_empty());
    assert!(resolver.all_packages().is_empty());
    assert!(resolver.location_of("a").is_none());
}

#[test]
fn cached_single_class_in_default_package() {
    let resolver = Resolver::cached(Resolver::fixed([class("a")]));
    assert_eq!(resolver.all_classes().len(), 1);
    assert_eq!(resolver.find_class("a").unwrap().unwrap().this_class, "a");
    assert_eq!(resolver.all_packages().iter().collect::<Vec<_>>(), vec![""]);
    assert!(resolver.contains_package(""));
}

#[test]
fn cached_lookups_return_the_same_instance() {
    let resolver = Resolver::cached(Resolver::fixed([class("p/A")]));
    let first = resolver.find_class("p/A").unwrap().unwrap();
    let second = resolver.find_class("p/A").unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(resolver.find_class("p/Missing").unwrap().is_none());
    assert!(resolver.find_class("p/Missing").unwrap().is_none());
}

#[test]
fn union_search_order_follows_member_order() {
    let same = "some/package/Same";
    let first = Arc::new(class(same));
    let second = Arc::new(class(same));

    let resolver1 = Arc::new(Resolver::Fixed(verifier_resolver::FixedClassesResolver::from_shared([
        Arc::new(class("some/package/Some1")),
        first.clone(),
    ])));
    let resolver2 = Arc::new(Resolver::Fixed(verifier_resolver::FixedClassesResolver::from_shared([
        Arc::new(class("some/package/Some2")),
        second.clone(),
    ])));

    let union = Resolver::union([resolver1.clone(), resolver2.clone()]);

    assert_eq!(
        union.all_packages().iter().collect::<Vec<_>>(),
        vec!["some", "some/package"]
    );
    assert_eq!(
        union.all_classes().iter().collect::<Vec<_>>(),
        vec!["some/package/Same", "some/package/Some1", "some/package/Some2"]
    );
    assert!(Arc::ptr_eq(&union.find_class(same).unwrap().unwrap(), &first));
    assert_eq!(union.find_class("some/package/Some2").unwrap().unwrap().this_class, "some/package/Some2");
    assert!(std::ptr::eq(union.location_of(same).unwrap(), &*resolver1));
    assert!(std::ptr::eq(union.location_of("some/package/Some2").unwrap(), &*resolver2));
}

#[test]
fn union_flattens_and_drops_empty_members() {
    let a = Resolver::fixed([class("A")]);
    let b = Resolver::fixed([class("B")]);
    let c = Resolver::fixed([class("C")]);

    let inner = Resolver::union([a.clone(), Arc::new(Resolver::Empty), b.clone()]);
    let outer = Resolver::union([inner, c.clone()]);
    match &*outer {
        Resolver::Union(union) => {
            let members = union.members();
            assert_eq!(members.len(), 3);
            assert!(Arc::ptr_eq(&members[0], &a));
            assert!(Arc::ptr_eq(&members[1], &b));
            assert!(Arc::ptr_eq(&members[2], &c));
        }
        other => panic!("expected a union, got {other}"),
    }

    assert!(Resolver::union(Vec::<Arc<Resolver>>::new()).is_empty());
    assert!(Arc::ptr_eq(&Resolver::union([Arc::new(Resolver::Empty), a.clone()]), &a));
}

#[test]
fn location_descends_through_caches() {
    let tmp = tempfile::tempdir().unwrap();
    let first = JarBuilder::new().class("x/Shared").write(&tmp.path().join("a.jar"));
    let second = JarBuilder::new()
        .class("x/Shared")
        .class("x/Only")
        .write(&tmp.path().join("b.jar"));

    let resolver = Resolver::cached(jars_resolver(&[first, second], ReadMode::Lazy).unwrap());
    assert!(resolver.to_string().starts_with("cached union"));
    assert!(resolver.location_of("x/Shared").unwrap().to_string().ends_with("a.jar"));
    assert!(resolver.location_of("x/Only").unwrap().to_string().ends_with("b.jar"));
    assert!(resolver.location_of("x/None").is_none());
    assert!(resolver.contains_class("x/Only"));
}
