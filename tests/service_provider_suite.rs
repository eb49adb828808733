//! The service provider, tested through the fixture framework itself.
//!
//! Every test shares a fresh provider built by the fixture's setUp, so this doubles as a check that scopes, setUp
//! and the registry behave when driven by real test code.

use std::any::Any;
use std::rc::Rc;

use fixtree::{EventLog, Scope, Suite, TestOutcome, Verdict, assert};
use fixtree_di::{Construct, DiError, Options, SELF_KEY, Service, ServiceProvider};

struct Foo {
    service: Option<Service>,
    timer: Option<Service>,
    extra: Option<Rc<i32>>,
    provider: Option<ServiceProvider>,
}

impl Construct for Foo {
    type Args = ();

    fn construct(_: (), options: Options) -> Self {
        Foo {
            service: options.get_service("service"),
            timer: options.get_service("timer"),
            extra: options.get::<i32>("extra"),
            provider: options.service_provider(),
        }
    }
}

/// Takes a positional argument ahead of its options.
struct Thing {
    thing: String,
    service: Option<Service>,
}

impl Construct for Thing {
    type Args = String;

    fn construct(thing: String, options: Options) -> Self {
        Thing {
            thing,
            service: options.get_service("service"),
        }
    }
}

struct Base;
struct Derived {
    service: Option<Service>,
}

impl Construct for Derived {
    type Args = ();

    fn construct(_: (), options: Options) -> Self {
        Derived {
            service: options.get_service("service"),
        }
    }
}

fn provider(scope: &Scope) -> Result<Rc<ServiceProvider>, fixtree::Failure> {
    scope.require::<ServiceProvider>("sp")
}

fn same(expected: &Service, actual: &Option<Service>) -> TestOutcome {
    let actual = actual.as_ref().ok_or_else(|| fixtree::Failure::assertion("service was not injected"))?;
    assert::is_true(Rc::ptr_eq(expected, actual))
}

fn declare(suite: &Suite) {
    suite
        .fixture("ServiceProvider", |f| {
            f.set_up(|scope| {
                scope.set("sp", ServiceProvider::new());
                Ok(())
            });

            f.test("instantiates objects", |scope| {
                let foo = provider(scope)?.create::<Foo>()?;
                assert::instance_of::<Foo>(&foo as &dyn Any)
            })?;

            f.test("satisfies dependencies", |scope| {
                let sp = provider(scope)?;
                let timer: Service = Rc::new(());
                sp.register_service("timer", Rc::clone(&timer));
                sp.declare_dependencies::<Foo>(&["timer"]);
                same(&timer, &sp.create::<Foo>()?.timer)
            })?;

            f.test("dependencies can be inherited from another type", |scope| {
                let sp = provider(scope)?;
                let service: Service = Rc::new(());
                sp.register_service("service", Rc::clone(&service));
                sp.declare_dependencies::<Base>(&["service"]);
                sp.inherit_dependencies::<Derived, Base>();
                same(&service, &sp.create::<Derived>()?.service)
            })?;

            f.test("throws error if dependency is not satisfied", |scope| {
                let sp = provider(scope)?;
                sp.declare_dependencies::<Foo>(&["timer"]);
                let err = assert::throws(|| sp.create::<Foo>().map(|_| ()))?;
                assert::equal(
                    err.to_string().as_str(),
                    "Unsatisfied dependencies \"timer\" when constructing Foo",
                )?;
                assert::equal(&err.kind(), &fixtree::ErrorKind::ReferenceError)
            })?;

            f.test("passing extra arguments", |scope| {
                let sp = provider(scope)?;
                let service: Service = Rc::new(());
                sp.register_service("service", Rc::clone(&service));
                sp.declare_dependencies::<Foo>(&["service"]);
                let foo = sp.create_with::<Foo>((), Options::new().with("extra", 10_i32))?;
                same(&service, &foo.service)?;
                assert::equal(&foo.extra.as_deref(), &Some(&10))
            })?;

            f.test("extra arguments override services", |scope| {
                let sp = provider(scope)?;
                sp.register("service", "first");
                sp.declare_dependencies::<Foo>(&["service"]);
                let second: Service = Rc::new("second");
                let mut extra = Options::new();
                extra.insert("service", Rc::clone(&second));
                same(&second, &sp.create_with::<Foo>((), extra)?.service)
            })?;

            f.test("extra arguments is the last parameter", |scope| {
                let sp = provider(scope)?;
                sp.register("service", "first");
                sp.declare_dependencies::<Thing>(&["service"]);
                let second: Service = Rc::new("second");
                let mut extra = Options::new();
                extra.insert("service", Rc::clone(&second));
                let thing = sp.create_with::<Thing>("thing".to_string(), extra)?;
                assert::equal(thing.thing.as_str(), "thing")?;
                same(&second, &thing.service)
            })?;

            f.test("passes itself into options", |scope| {
                let sp = provider(scope)?;
                let foo = sp.create::<Foo>()?;
                let injected = foo
                    .provider
                    .ok_or_else(|| fixtree::Failure::assertion("provider missing"))?;
                assert::is_true(injected.ptr_eq(&sp))?;
                assert::equal(SELF_KEY, "serviceProvider")
            })?;

            f.test("unnecessary services aren't given", |scope| {
                let sp = provider(scope)?;
                sp.register("service", ());
                let foo = sp.create::<Foo>()?;
                assert::is_true(foo.service.is_none())
            })?;

            f.test("trying to create an unknown type throws a helpful error", |scope| {
                let sp = provider(scope)?;
                let err = assert::throws(|| sp.create_named("10", Options::new()).map(|_| ()))?;
                assert::equal(&err, &DiError::BadClassType("10".to_string()))?;
                assert::equal(
                    err.to_string().as_str(),
                    "Passed bad class type \"10\" to ServiceProvider.new()",
                )
            })?;

            f.test("attempting to get unknown services raises ReferenceError", |scope| {
                let sp = provider(scope)?;
                let err = assert::throws(|| sp.get_service("service").map(|_| ()))?;
                assert::equal(err.to_string().as_str(), "No service registered for \"service\"")?;
                assert::equal(&fixtree::Failure::from(err).kind, &fixtree::ErrorKind::ReferenceError)
            })?;

            f.test("looking up registered services", |scope| {
                let sp = provider(scope)?;
                let service: Service = Rc::new(());
                sp.register_service("service", Rc::clone(&service));
                let found = sp.get_service("service")?;
                assert::is_true(Rc::ptr_eq(&service, &found))
            })
        })
        .map(|_| ())
        .unwrap();
}

#[test]
fn service_provider_fixture_passes() {
    let suite = Suite::new();
    declare(&suite);
    assert_eq!(suite.test_names().len(), 12);

    let log = EventLog::new();
    assert!(suite.run_all(&mut log.clone()), "first failure: {:?}", log.first_failure());
    assert!(log.verdicts().iter().all(|(_, verdict)| *verdict == Verdict::Pass));
    assert_eq!(log.started()[0], "ServiceProvider: instantiates objects");
}

#[test]
fn providers_do_not_leak_between_tests() {
    let suite = Suite::new();
    suite
        .fixture("Isolation", |f| {
            f.set_up(|scope| {
                scope.set("sp", ServiceProvider::new());
                Ok(())
            });
            f.test("registers", |scope| {
                provider(scope)?.register("service", 1_u8);
                Ok(())
            })?;
            f.test("does not see the registration", |scope| {
                assert::is_false(provider(scope)?.get_service("service").is_ok())
            })
        })
        .unwrap();
    assert!(suite.run_all(&mut EventLog::new()));
}
