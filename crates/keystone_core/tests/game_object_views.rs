//! # Game Object View Tests
//!
//! Registry-driven population, Apply/Query dispatch and view lifetimes
//! across the public API.

use std::any::Any;
use std::sync::Arc;

use keystone_core::components::{
    get_string_id, RoStringQuery, StringId, StringIdComponent, StringIdView, TriggerComponent,
    TriggerView,
};
use keystone_core::ecs::{find_value, ComponentStore, Has, ValueMap};
use keystone_core::{
    apply, apply_each, component_id, query_ref, BasicComponent, BasicView, ComponentBlob,
    ComponentData, ComponentId, CoreError, CoreResult, GameObject, Read, Registry, View, Write,
};

const SPEED_SCALE_KEY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Speed(f32);

impl ComponentData for Speed {
    const ID: ComponentId = component_id("Speed");
    const NAME: &'static str = "Speed";

    fn add_component_view(
        component: &Arc<BasicComponent<Self>>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let raw: [u8; 4] = blob.try_into().map_err(|_| CoreError::BlobTooSmall {
            id: Self::ID,
            expected: 4,
            actual: blob.len(),
        })?;
        let scale = find_value::<f32>(values, SPEED_SCALE_KEY).copied().unwrap_or(1.0);
        let speed = Speed(f32::from_le_bytes(raw) * scale);
        go.add_view(|| BasicView::new(component, speed));
        Ok(())
    }
}

fn registry() -> (Registry, Arc<StringIdComponent>, Arc<BasicComponent<Speed>>) {
    let registry = Registry::new();
    let names = registry.register(StringIdComponent::shared()).unwrap();
    let speeds = registry.register(BasicComponent::<Speed>::shared()).unwrap();
    registry.register(TriggerComponent::shared()).unwrap();
    (registry, names, speeds)
}

#[test]
fn populate_from_blobs() {
    let (registry, names, speeds) = registry();
    let mut name = [0_u8; 64];
    name[..4].copy_from_slice(b"ship");
    let speed = 2.5_f32.to_le_bytes();
    let scale = 2.0_f32;

    let mut go = GameObject::new();
    registry
        .populate(
            &mut go,
            &[(SPEED_SCALE_KEY, &scale as &dyn Any)],
            &[
                ComponentBlob::new(StringId::ID, &name),
                ComponentBlob::new(Speed::ID, &speed),
            ],
        )
        .unwrap();

    assert_eq!(get_string_id(&go).as_deref(), Some("ship"));
    assert_eq!(*go.get_view::<BasicView<Speed>>().unwrap().get(), Speed(5.0));
    assert_eq!((names.row_count(), speeds.row_count()), (1, 1));

    drop(go);
    assert_eq!((names.row_count(), speeds.row_count()), (0, 0));
}

#[test]
fn populate_reports_bad_blobs() {
    let (registry, _, _) = registry();
    let mut go = GameObject::new();

    let short = [0_u8; 2];
    let err = registry
        .populate(&mut go, &[], &[ComponentBlob::new(Speed::ID, &short)])
        .err();
    assert!(matches!(err, Some(CoreError::BlobTooSmall { actual: 2, .. })));

    let unknown = registry
        .populate(&mut go, &[], &[ComponentBlob::new(component_id("Nope"), &short)])
        .err();
    assert!(matches!(unknown, Some(CoreError::NotInitialized(_))));
}

#[test]
fn apply_and_query_over_many_objects() {
    let (_, names, speeds) = registry();
    let mut objects: Vec<GameObject> = (0..10)
        .map(|i| {
            let mut go = GameObject::new();
            go.add_view(|| StringIdView::new(&names, &format!("obj{i}")));
            if i % 2 == 0 {
                go.add_view(|| BasicView::new(&speeds, Speed(i as f32)));
            }
            go
        })
        .collect();

    let moved = apply_each::<(Read<StringIdView>, Write<BasicView<Speed>>)>(
        objects.iter_mut(),
        |(_, speed)| speed.get_mut().0 += 1.0,
    );
    assert_eq!(moved, 5);

    let found = apply::<Write<BasicView<Speed>>, _>(
        &mut objects[4],
        |speed| speed.get().0,
        || -1.0,
    );
    assert!((found - 5.0).abs() < f32::EPSILON);
    let missing: f32 = apply::<Write<BasicView<Speed>>, _>(&mut objects[3], |_| 0.0, || -1.0);
    assert!((missing + 1.0).abs() < f32::EPSILON);

    let named: Vec<usize> = objects
        .iter()
        .enumerate()
        .filter(|(_, go)| {
            query_ref(
                go,
                &(RoStringQuery::new(&["obj2", "obj3"]), Has::<Read<BasicView<Speed>>>::new()),
            )
            .is_some()
        })
        .map(|(i, _)| i)
        .collect();
    assert_eq!(named, vec![2]);
}

#[test]
fn removing_views_frees_rows() {
    let (_, names, _) = registry();
    let triggers = TriggerComponent::shared();
    let mut go = GameObject::new();
    go.add_view(|| StringIdView::new(&names, "a"));
    go.add_view(|| TriggerView::new(&triggers));
    assert_eq!(go.len(), 2);

    assert!(go.remove::<StringIdView>());
    assert!(!go.has::<StringIdView>());
    assert_eq!(names.row_count(), 0);
    assert!(go.has_view(TriggerView::COMPONENT_ID));

    go.release();
    assert!(go.is_empty());
    assert_eq!(triggers.row_count(), 0);
}
