//! Integration tests for the reflection layer
//!
//! Tests cover:
//! - Registration, lookup and enumeration
//! - Inheritance (single and multiple) with pointer adjustment
//! - Member access through live views
//! - Conversions and overload resolution
//! - Properties with missing accessors
//! - Managed objects and configuration loading

use lumen_reflect::types::{Reflect, TypeBuilder};
use lumen_reflect::{inherit, Data, Dynamic, Obj, ReflectConfig, ReflectError, TypeRegistry};
use std::io::Write;

#[derive(Debug, Clone, Default, PartialEq)]
struct Named {
    name: String,
}

impl Data for Named {}

impl Reflect for Named {
    const TYPE_NAME: &'static str = "Named";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        builder.default_constructor();
        builder.field("name", |n| &mut n.name);
        builder.const_method("Greeting", |n: &Named| format!("hello {}", n.name));
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Health {
    hp: i32,
}

impl Data for Health {}

impl Reflect for Health {
    const TYPE_NAME: &'static str = "Health";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        builder.default_constructor();
        builder.field("hp", |h| &mut h.hp);
        builder.method("Damage", |h: &mut Health, amount: i32| {
            h.hp -= amount;
            h.hp
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Unit {
    tag: u32,
    named: Named,
    health: Health,
}

impl Data for Unit {}

impl Reflect for Unit {
    const TYPE_NAME: &'static str = "Unit";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        inherit!(builder, Unit, named: Named);
        inherit!(builder, Unit, health: Health);
        builder.default_constructor();
        builder.copy_constructor();
        builder.field("tag", |u| &mut u.tag);
    }
}

#[derive(Debug, Clone, Default)]
struct Gauge {
    raw: i32,
}

impl Data for Gauge {}

impl Reflect for Gauge {
    const TYPE_NAME: &'static str = "Gauge";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        builder.default_constructor();
        builder.readonly_property("Doubled", |g: &Gauge| g.raw * 2);
        builder.writeonly_property("Reset", |g: &mut Gauge, value: i32| g.raw = value);
        builder.method("Put", |g: &mut Gauge, v: i64| g.raw = v as i32);
        builder.method("Put", |g: &mut Gauge, v: f64| g.raw = v as i32);
    }
}

fn registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry.register::<Named>();
    registry.register::<Health>();
    registry.register::<Unit>();
    registry.register::<Gauge>();
    registry.reflect_all();
    registry
}

fn sample_unit() -> Unit {
    Unit {
        tag: 7,
        named: Named {
            name: "scout".to_owned(),
        },
        health: Health { hp: 30 },
    }
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_registered_names_resolve() {
    let registry = registry();
    let unit = registry.resolve("Unit").unwrap();
    assert!(unit.is::<Unit>());
    assert_eq!(registry.type_name(unit.id()).as_deref(), Some("Unit"));
    assert_eq!(registry.type_id("Unit"), Some(unit.id()));
    assert!(registry.resolve("Missing").is_none());

    let names: Vec<String> = registry.types().iter().map(|t| t.name().to_owned()).collect();
    let named = names.iter().position(|n| n == "Named").unwrap();
    let unit = names.iter().position(|n| n == "Unit").unwrap();
    assert!(named < unit);
}

#[test]
fn test_describe_values() {
    let registry = registry();
    assert_eq!(registry.describe(&registry.wrap(sample_unit())), "[Unit]");
    assert_eq!(registry.describe(&Dynamic::null()), "[null]");
}

// ============================================================================
// Inheritance
// ============================================================================

#[test]
fn test_base_members_are_inherited() {
    let registry = registry();
    let unit = registry.resolve("Unit").unwrap();
    let fields: Vec<String> = unit.fields().iter().map(|f| f.name().to_owned()).collect();
    assert_eq!(fields, ["name", "hp", "tag"]);
    assert_eq!(unit.own_members().len(), 3);
    assert!(unit.in_class_hierarchy());
    assert!(unit.has_method("Greeting"));
    assert!(unit.has_method("Damage"));
}

#[test]
fn test_multiple_bases_read_through_adjusted_pointers() {
    let registry = registry();
    let unit = registry.wrap(sample_unit());
    assert_eq!(unit.member("name").extract::<String>().unwrap(), "scout");
    assert_eq!(unit.member("hp").extract::<i32>().unwrap(), 30);
    assert_eq!(unit.member("tag").extract::<u32>().unwrap(), 7);

    unit.member("hp").set(&registry.wrap(12i32)).unwrap();
    assert_eq!(unit.extract::<Unit>().unwrap().health.hp, 12);

    let greeting = unit.call("Greeting", &[]).unwrap();
    assert_eq!(greeting.extract::<String>().unwrap(), "hello scout");
    let left = unit.call("Damage", &[registry.wrap(2i32)]).unwrap();
    assert_eq!(left.extract::<i32>().unwrap(), 10);
}

#[test]
fn test_upcast_extracts_base_value() {
    let registry = registry();
    let unit = registry.wrap(sample_unit());
    assert_eq!(unit.extract::<Health>().unwrap(), Health { hp: 30 });
    assert_eq!(unit.extract::<Named>().unwrap().name, "scout");
}

#[test]
fn test_downcast_of_base_storage_fails() {
    let registry = registry();
    let base = registry.wrap(Health { hp: 1 });
    assert!(matches!(
        base.extract::<Unit>(),
        Err(ReflectError::Conversion { .. })
    ));
}

#[test]
fn test_cast_pointer_round_trip() {
    let registry = registry();
    let unit_type = registry.resolve("Unit").unwrap();
    let health_type = registry.resolve("Health").unwrap();
    let gauge_type = registry.resolve("Gauge").unwrap();
    assert!(unit_type.is_derived_from(&health_type));
    assert!(!health_type.is_derived_from(&unit_type));

    let mut unit = sample_unit();
    let ptr = std::ptr::NonNull::from(&mut unit).cast::<u8>();
    let base = unit_type.cast_pointer(ptr, &health_type).unwrap();
    assert_eq!(base.cast::<Health>().as_ptr(), std::ptr::addr_of_mut!(unit.health));
    assert_eq!(health_type.cast_pointer(base, &unit_type), Some(ptr));
    assert!(unit_type.cast_pointer(ptr, &gauge_type).is_none());
}

#[test]
fn test_related_types_convert_both_ways() {
    let registry = registry();
    let unit = registry.resolve("Unit").unwrap();
    let named = registry.resolve("Named").unwrap();
    let gauge = registry.resolve("Gauge").unwrap();
    assert!(registry.can_convert(&unit, &named));
    assert!(registry.can_convert(&named, &unit));
    assert!(!registry.can_convert(&unit, &gauge));
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq)]
struct Core {
    id: u64,
}

impl Data for Core {}

impl Reflect for Core {
    const TYPE_NAME: &'static str = "Core";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        builder.default_constructor();
        builder.field("id", |c| &mut c.id);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq)]
struct Mid {
    weight: u32,
    core: Core,
}

impl Data for Mid {}

impl Reflect for Mid {
    const TYPE_NAME: &'static str = "Mid";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        inherit!(builder, Mid, core: Core);
        builder.default_constructor();
        builder.field("weight", |m| &mut m.weight);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq)]
struct Side {
    extra: u64,
    core: Core,
}

impl Data for Side {}

impl Reflect for Side {
    const TYPE_NAME: &'static str = "Side";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        inherit!(builder, Side, core: Core);
        builder.default_constructor();
    }
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq)]
struct Leaf {
    flags: u64,
    mid: Mid,
}

impl Data for Leaf {}

impl Reflect for Leaf {
    const TYPE_NAME: &'static str = "Leaf";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        inherit!(builder, Leaf, mid: Mid);
        builder.default_constructor();
    }
}

/// Reaches `Core` through both `Mid` and `Side`
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq)]
struct Twin {
    left: Mid,
    right: Side,
}

impl Data for Twin {}

impl Reflect for Twin {
    const TYPE_NAME: &'static str = "Twin";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        inherit!(builder, Twin, left: Mid);
        inherit!(builder, Twin, right: Side);
        builder.default_constructor();
    }
}

/// Same layout as `Twin`, bases declared in the opposite order
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq)]
struct Mirror {
    left: Mid,
    right: Side,
}

impl Data for Mirror {}

impl Reflect for Mirror {
    const TYPE_NAME: &'static str = "Mirror";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        inherit!(builder, Mirror, right: Side);
        inherit!(builder, Mirror, left: Mid);
        builder.default_constructor();
    }
}

fn hierarchy_registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry.register::<Core>();
    registry.register::<Mid>();
    registry.register::<Side>();
    registry.register::<Leaf>();
    registry.register::<Twin>();
    registry.register::<Mirror>();
    registry.reflect_all();
    registry
}

fn core_id(id: u64) -> Core {
    Core { id }
}

#[test]
fn test_multi_level_cast_round_trip() {
    let registry = hierarchy_registry();
    let leaf_type = registry.resolve("Leaf").unwrap();
    let mid_type = registry.resolve("Mid").unwrap();
    let core_type = registry.resolve("Core").unwrap();
    assert!(leaf_type.is_derived_from(&core_type));
    assert!(!core_type.is_derived_from(&leaf_type));

    let mut leaf = Leaf {
        flags: 1,
        mid: Mid {
            weight: 2,
            core: core_id(3),
        },
    };
    let ptr = std::ptr::NonNull::from(&mut leaf).cast::<u8>();

    let base = leaf_type.cast_pointer(ptr, &core_type).unwrap();
    assert_ne!(base, ptr);
    assert_eq!(base.cast::<Core>().as_ptr(), std::ptr::addr_of_mut!(leaf.mid.core));
    assert_eq!(core_type.cast_pointer(base, &leaf_type), Some(ptr));

    let mid = leaf_type.cast_pointer(ptr, &mid_type).unwrap();
    assert_eq!(mid_type.cast_pointer(mid, &core_type), Some(base));
    assert_eq!(core_type.cast_pointer(base, &mid_type), Some(mid));
}

#[test]
fn test_multi_level_members_and_extract() {
    let registry = hierarchy_registry();
    let leaf = registry.wrap(Leaf {
        flags: 0,
        mid: Mid {
            weight: 5,
            core: core_id(9),
        },
    });
    assert_eq!(leaf.member("id").extract::<u64>().unwrap(), 9);
    assert_eq!(leaf.member("weight").extract::<u32>().unwrap(), 5);

    leaf.member("id").set(&registry.wrap(11i32)).unwrap();
    assert_eq!(leaf.extract::<Core>().unwrap(), core_id(11));
    assert_eq!(leaf.extract::<Leaf>().unwrap().mid.core, core_id(11));
}

#[test]
fn test_diamond_resolves_to_first_declared_base() {
    let registry = hierarchy_registry();
    let core_type = registry.resolve("Core").unwrap();
    let twin_type = registry.resolve("Twin").unwrap();
    let mirror_type = registry.resolve("Mirror").unwrap();

    let mut twin = Twin {
        left: Mid {
            weight: 0,
            core: core_id(1),
        },
        right: Side {
            extra: 0,
            core: core_id(2),
        },
    };
    let ptr = std::ptr::NonNull::from(&mut twin).cast::<u8>();
    let base = twin_type.cast_pointer(ptr, &core_type).unwrap();
    assert_eq!(base.cast::<Core>().as_ptr(), std::ptr::addr_of_mut!(twin.left.core));
    assert_eq!(core_type.cast_pointer(base, &twin_type), Some(ptr));

    let mut mirror = Mirror {
        left: twin.left.clone(),
        right: twin.right.clone(),
    };
    let ptr = std::ptr::NonNull::from(&mut mirror).cast::<u8>();
    let base = mirror_type.cast_pointer(ptr, &core_type).unwrap();
    assert_eq!(base.cast::<Core>().as_ptr(), std::ptr::addr_of_mut!(mirror.right.core));
    assert_eq!(core_type.cast_pointer(base, &mirror_type), Some(ptr));

    assert_eq!(registry.wrap(twin).extract::<Core>().unwrap(), core_id(1));
    assert_eq!(registry.wrap(mirror).extract::<Core>().unwrap(), core_id(2));
}

// ============================================================================
// Values
// ============================================================================

#[test]
fn test_copy_is_independent() {
    let registry = registry();
    let unit = registry.wrap(sample_unit());
    let copy = registry.resolve("Unit").unwrap().copy(&unit).unwrap();
    unit.member("tag").set(&registry.wrap(99i32)).unwrap();
    assert_eq!(copy.member("tag").extract::<u32>().unwrap(), 7);
    assert_eq!(unit.member("tag").extract::<u32>().unwrap(), 99);
}

#[test]
fn test_copy_without_copy_constructor_is_unsupported() {
    let registry = registry();
    let gauge = registry.wrap(Gauge::default());
    assert!(matches!(
        registry.resolve("Gauge").unwrap().copy(&gauge),
        Err(ReflectError::Unsupported(_))
    ));
}

#[test]
#[should_panic]
fn test_member_access_on_null_panics() {
    let _ = Dynamic::null().member("hp");
}

#[test]
fn test_new_instance_by_name() {
    let registry = registry();
    let unit = registry.new_instance("Unit");
    assert_eq!(unit.extract::<Unit>().unwrap(), Unit::default());
    assert!(registry.new_instance("Missing").is_null());
}

// ============================================================================
// Properties and overloads
// ============================================================================

#[test]
fn test_readonly_and_writeonly_properties() {
    let registry = registry();
    let gauge = registry.wrap(Gauge { raw: 4 });
    assert_eq!(gauge.member("Doubled").extract::<i32>().unwrap(), 8);
    assert!(matches!(
        gauge.member("Doubled").set(&registry.wrap(1i32)),
        Err(ReflectError::NotWritable(_))
    ));

    gauge.member("Reset").set(&registry.wrap(10i32)).unwrap();
    assert_eq!(gauge.member("Doubled").extract::<i32>().unwrap(), 20);
    assert!(matches!(
        gauge.member("Reset").get(),
        Err(ReflectError::NotReadable(_))
    ));
}

#[test]
fn test_overloads_exact_and_ambiguous() {
    let registry = registry();
    let gauge = registry.wrap(Gauge::default());
    gauge.call("Put", &[registry.wrap(5i64)]).unwrap();
    assert_eq!(gauge.member("Doubled").extract::<i32>().unwrap(), 10);
    gauge.call("Put", &[registry.wrap(2.9f64)]).unwrap();
    assert_eq!(gauge.member("Doubled").extract::<i32>().unwrap(), 4);

    assert!(matches!(
        gauge.call("Put", &[registry.wrap(3i32)]),
        Err(ReflectError::AmbiguousCall(name)) if name == "Put"
    ));
    assert!(matches!(
        gauge.call("Put", &[registry.wrap("x".to_owned())]),
        Err(ReflectError::NotCallable(_))
    ));
}

// ============================================================================
// Managed objects
// ============================================================================

#[derive(Debug, Default)]
struct Actor {
    speed: f32,
}

impl Reflect for Actor {
    const TYPE_NAME: &'static str = "Actor";
    const MANAGED: bool = true;

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        builder.default_constructor();
        builder.field("speed", |a| &mut a.speed);
    }
}

#[test]
fn test_managed_instances_share_state() {
    let registry = registry();
    registry.register::<Actor>();
    registry.reflect_all();

    let actor = registry.new_instance("Actor");
    let id = actor.instance_id().unwrap();
    assert!(registry.identity().contains(id));

    let alias = actor.clone();
    alias.member("speed").set(&registry.wrap(2.5f64)).unwrap();
    let typed = actor.extract::<Obj<Actor>>().unwrap();
    assert_eq!(typed.speed, 2.5);
    assert_eq!(typed.instance_id(), id);

    drop((actor, alias, typed));
    assert!(!registry.identity().contains(id));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_depth = 8\nfloat_precision = 2\nmigrate_legacy_documents = false").unwrap();

    let config = ReflectConfig::load(file.path()).unwrap();
    assert_eq!(config.max_depth, 8);
    assert_eq!(config.float_precision, 2);
    assert!(!config.migrate_legacy_documents);
    assert_eq!(config.migrations.len(), 4);

    let registry = TypeRegistry::with_config(config);
    assert_eq!(registry.config().max_depth, 8);
}

#[test]
fn test_config_errors() {
    assert!(matches!(
        ReflectConfig::from_toml_str("max_depth = \"deep\""),
        Err(ReflectError::Config(_))
    ));
    assert!(matches!(
        ReflectConfig::load("/nonexistent/lumen.toml"),
        Err(ReflectError::Config(_))
    ));
}
