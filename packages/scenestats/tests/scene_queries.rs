//! Item queries against the fixture scene, including a session that fails
//! some engine calls.
//!
//! Run with: cargo test --test scene_queries

use std::collections::HashSet;

use scenestats::item_type::classify;
use scenestats::memory_session::SceneSnapshot;
use scenestats::{
    EngineSession, FailurePolicy, ItemHandle, ItemKind, ItemQuery, MemorySession, SceneError,
    SceneResult, StatisticsTable,
};

const FIXTURE: &str = include_str!("fixtures/cells_scene.json");

fn open_fixture() -> MemorySession {
    let snapshot: SceneSnapshot = serde_json::from_str(FIXTURE).unwrap();
    MemorySession::open(snapshot).unwrap()
}

/// Delegates to a [`MemorySession`] but fails or distorts selected engine calls.
struct FaultySession {
    inner: MemorySession,
    failing_kind_test: Option<ItemKind>,
    failing_cast: Option<ItemKind>,
    stale_cast: bool,
    /// Items of the first kind also report being the second.
    overlapping_kinds: Option<(ItemKind, ItemKind)>,
    /// An item that vanished from the engine but is still listed as a child.
    vanished: Option<ItemHandle>,
}

impl FaultySession {
    fn new(inner: MemorySession) -> Self {
        Self {
            inner,
            failing_kind_test: None,
            failing_cast: None,
            stale_cast: false,
            overlapping_kinds: None,
            vanished: None,
        }
    }

    fn check_present(&self, item: ItemHandle) -> SceneResult<()> {
        if self.vanished == Some(item) {
            return Err(SceneError::StaleHandle(item));
        }
        Ok(())
    }
}

impl EngineSession for FaultySession {
    fn root(&self) -> Option<ItemHandle> {
        self.inner.root()
    }

    fn is_kind(&self, item: ItemHandle, kind: ItemKind) -> SceneResult<bool> {
        self.check_present(item)?;
        if self.failing_kind_test == Some(kind) {
            return Err(SceneError::Engine(format!("{} test not supported", kind)));
        }
        if let Some((actual, also)) = self.overlapping_kinds {
            if kind == also && self.inner.is_kind(item, actual)? {
                return Ok(true);
            }
        }
        self.inner.is_kind(item, kind)
    }

    fn cast(&self, item: ItemHandle, kind: ItemKind) -> SceneResult<ItemHandle> {
        self.check_present(item)?;
        if self.stale_cast {
            return Err(SceneError::StaleHandle(item));
        }
        if self.failing_cast == Some(kind) {
            return Err(SceneError::Engine("proxy creation failed".to_string()));
        }
        self.inner.cast(item, kind)
    }

    fn children(&self, container: ItemHandle) -> SceneResult<Vec<ItemHandle>> {
        self.inner.children(container)
    }

    fn name(&self, item: ItemHandle) -> SceneResult<String> {
        self.check_present(item)?;
        self.inner.name(item)
    }

    fn visible(&self, item: ItemHandle) -> SceneResult<bool> {
        self.inner.visible(item)
    }

    fn measurements(&self, item: ItemHandle) -> SceneResult<StatisticsTable> {
        self.inner.measurements(item)
    }

    fn append_measurements(&mut self, item: ItemHandle, batch: &StatisticsTable) -> SceneResult<()> {
        self.inner.append_measurements(item, batch)
    }
}

fn names(session: &dyn EngineSession, query: &ItemQuery) -> Vec<String> {
    query.find(session).unwrap().into_iter().map(|f| f.name).collect()
}

#[test]
fn test_direct_children_in_order() {
    let session = open_fixture();
    let query = ItemQuery::builder().build();
    assert_eq!(
        names(&session, &query),
        vec!["Volume 1", "Camera 1", "Light Source 1", "Frame 1", "Nuclei", "Analysis"]
    );
}

#[test]
fn test_recursive_visits_every_descendant_once() {
    let session = open_fixture();
    let query = ItemQuery::builder().recursive(true).build();
    let found = query.find(&session).unwrap();

    let order: Vec<&str> = found.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "Volume 1",
            "Camera 1",
            "Light Source 1",
            "Frame 1",
            "Nuclei",
            "Analysis",
            "Foci",
            "Reference Frame 1",
            "Measurement Points 1",
            "Clipping Plane 1",
            "Tracks",
            "Nested",
            "Foci",
        ]
    );

    let unique: HashSet<ItemHandle> = found.iter().map(|f| f.handle).collect();
    assert_eq!(unique.len(), found.len());
}

#[test]
fn test_every_item_classifies_as_its_created_kind() {
    let session = open_fixture();
    let expected = [
        ("Volume 1", Some(ItemKind::Volume)),
        ("Camera 1", Some(ItemKind::Camera)),
        ("Light Source 1", Some(ItemKind::Light)),
        ("Frame 1", Some(ItemKind::Frame)),
        ("Nuclei", Some(ItemKind::Region)),
        ("Analysis", Some(ItemKind::Group)),
        ("Reference Frame 1", Some(ItemKind::ReferenceFrame)),
        ("Measurement Points 1", Some(ItemKind::MeasurementPoints)),
        ("Clipping Plane 1", Some(ItemKind::ClippingPlane)),
        ("Tracks", None),
    ];

    let found = ItemQuery::builder().recursive(true).build().find(&session).unwrap();
    for (name, kind) in expected {
        let item = found.iter().find(|f| f.name == name).unwrap();
        assert_eq!(classify(&session, item.handle), kind, "{}", name);
        assert_eq!(item.kind(), kind, "{}", name);
    }
}

#[test]
fn test_kind_filter_finds_nested_point_sets() {
    let session = open_fixture();
    let found = ItemQuery::builder()
        .kind(ItemKind::PointSet)
        .recursive(true)
        .build()
        .find(&session)
        .unwrap();

    assert_eq!(found.len(), 2);
    assert!(found[0].visible);
    assert!(!found[1].visible);

    let shallow = ItemQuery::builder().kind(ItemKind::PointSet).build().find(&session).unwrap();
    assert!(shallow.is_empty());
}

#[test]
fn test_query_sees_live_scene_changes() {
    let mut session = open_fixture();
    let query = ItemQuery::builder().name("Camera 1").build();
    let camera = query.find_first(&session).unwrap().unwrap();

    session.set_name(camera.handle, "Overview").unwrap();
    assert!(query.find(&session).unwrap().is_empty());
}

#[test]
fn test_failing_kind_test_does_not_abort_scan() {
    let session = FaultySession {
        failing_kind_test: Some(ItemKind::Camera),
        ..FaultySession::new(open_fixture())
    };

    let found = ItemQuery::builder().build().find(&session).unwrap();
    assert_eq!(found.len(), 6);

    let camera = found.iter().find(|f| f.name == "Camera 1").unwrap();
    assert_eq!(camera.kind(), None);
    let volume = found.iter().find(|f| f.name == "Volume 1").unwrap();
    assert_eq!(volume.kind(), Some(ItemKind::Volume));

    let cameras = ItemQuery::builder().kind(ItemKind::Camera).build().find(&session).unwrap();
    assert!(cameras.is_empty());
}

#[test]
fn test_conversion_failure_policies() {
    let session = FaultySession {
        failing_cast: Some(ItemKind::Region),
        ..FaultySession::new(open_fixture())
    };

    let best_effort = ItemQuery::builder().name("Nuclei").build();
    let found = best_effort.find(&session).unwrap();
    assert_eq!(found.len(), 1);
    assert!(!found[0].is_resolved());

    let strict = ItemQuery::builder().name("Nuclei").policy(FailurePolicy::Strict).build();
    let err = strict.find(&session).unwrap_err();
    assert!(matches!(err, SceneError::Conversion { kind: ItemKind::Region, .. }));

    // Items of other kinds are unaffected in strict mode.
    let cameras = ItemQuery::builder()
        .kind(ItemKind::Camera)
        .policy(FailurePolicy::Strict)
        .build();
    assert_eq!(cameras.find(&session).unwrap().len(), 1);
}

#[test]
fn test_stale_cast_propagates_under_both_policies() {
    let session = FaultySession {
        stale_cast: true,
        ..FaultySession::new(open_fixture())
    };

    for policy in [FailurePolicy::BestEffort, FailurePolicy::Strict] {
        let err = ItemQuery::builder()
            .name("Nuclei")
            .policy(policy)
            .build()
            .find(&session)
            .unwrap_err();
        assert!(err.is_stale(), "{:?}", policy);
    }

    // Unrecognized items are never cast, so they still come back.
    let tracks = ItemQuery::builder()
        .name("Tracks")
        .recursive(true)
        .build()
        .find(&session)
        .unwrap();
    assert_eq!(tracks.len(), 1);
}

#[test]
fn test_overlapping_kind_tests_classify_as_first_kind() {
    // Regions also claim to be volumes.
    let session = FaultySession {
        overlapping_kinds: Some((ItemKind::Region, ItemKind::Volume)),
        ..FaultySession::new(open_fixture())
    };
    let nuclei = ItemQuery::builder().name("Nuclei").build().find_first(&session).unwrap().unwrap();
    assert_eq!(classify(&session, nuclei.handle), Some(ItemKind::Region));
    assert_eq!(nuclei.kind(), Some(ItemKind::Region));

    // Volumes that also claim to be point sets resolve to the earlier kind.
    let session = FaultySession {
        overlapping_kinds: Some((ItemKind::Volume, ItemKind::PointSet)),
        ..FaultySession::new(open_fixture())
    };
    let volume = ItemQuery::builder().name("Volume 1").build().find_first(&session).unwrap().unwrap();
    assert_eq!(classify(&session, volume.handle), Some(ItemKind::PointSet));
    assert_eq!(
        ItemQuery::builder().kind(ItemKind::Volume).build().find(&session).unwrap().len(),
        0
    );
}

#[test]
fn test_vanished_child_is_skipped() {
    let inner = open_fixture();
    let camera = ItemQuery::builder().name("Camera 1").build().find_first(&inner).unwrap().unwrap();
    let session = FaultySession {
        vanished: Some(camera.handle),
        ..FaultySession::new(inner)
    };

    let found = ItemQuery::builder().build().find(&session).unwrap();
    assert_eq!(
        found.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        vec!["Volume 1", "Light Source 1", "Frame 1", "Nuclei", "Analysis"]
    );
    assert!(found.iter().all(|f| f.handle != camera.handle));
}
