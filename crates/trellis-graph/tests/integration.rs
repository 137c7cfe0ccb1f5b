//! Integration tests for trellis-graph against a live Neo4j instance.
//!
//! Requires Neo4j 5 with the APOC plugin on the configured URI.
//! Run with: cargo test --package trellis-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use trellis_core::edits::{
    AddPropertyFact, CreateEntry, DeletePropertyFact, EntryFields, EntryKeyMatch, EntryLocator,
    RelationshipSet, RelationshipTarget, SetRelationships, UpdatePropertyFact, UpsertEntryByKey,
};
use trellis_core::{
    BulkEdit, ConnectionId, Edit, EditResult, EngineConfig, EntryId, EntryTypeId, PropertyFactId, PropertyId,
    SiteId, ValueExpression,
};
use trellis_graph::properties::FactSource;
use trellis_graph::relationships::{RelDirection, RelationshipQuery};
use trellis_graph::{EditEngine, EditError, GraphClient, GraphConfig, InvalidEdit};

const MAX_DEPTH: u32 = 50;

async fn connect_or_skip() -> Option<GraphClient> {
    let config = GraphConfig::default();
    match GraphClient::connect(&config).await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

/// A site with one entry type and a small property schema.
struct Fixture {
    site_id: SiteId,
    connection_id: ConnectionId,
    habitat_id: PropertyId,
    status_id: PropertyId,
    parent_id: PropertyId,
}

async fn seed(client: &GraphClient) -> Fixture {
    let fx = Fixture {
        site_id: SiteId::new(),
        connection_id: ConnectionId::new(),
        habitat_id: PropertyId::new(),
        status_id: PropertyId::new(),
        parent_id: PropertyId::new(),
    };
    let q = neo4rs::query(
        "CREATE (:Site {id: $site_id, name: 'integration'})
         CREATE (et:EntryType {id: $type_id, site_id: $site_id, key: 'species', name: 'Species'})
         CREATE (:Property {id: $parent_id, site_id: $site_id, key: 'parent', name: 'Parent',
                 type: 'RelIsA', mode: 'Optional', rank: 0, inheritable: false, default: ''})
                -[:APPLIES_TO_TYPE]->(et)
         CREATE (:Property {id: $habitat_id, site_id: $site_id, key: 'habitat', name: 'Habitat',
                 type: 'Value', mode: 'Optional', rank: 1, inheritable: true, default: ''})
                -[:APPLIES_TO_TYPE]->(et)
         CREATE (:Property {id: $related_id, site_id: $site_id, key: 'related', name: 'Related',
                 type: 'RelOther', mode: 'Optional', rank: 2, inheritable: false, default: ''})
                -[:APPLIES_TO_TYPE]->(et)
         CREATE (:Property {id: $status_id, site_id: $site_id, key: 'status', name: 'Status',
                 type: 'Value', mode: 'Auto', rank: 3, inheritable: false, default: '\"unknown\"'})
                -[:APPLIES_TO_TYPE]->(et)
         CREATE (gt:EntryType {id: $genus_type_id, site_id: $site_id, key: 'genus', name: 'Genus'})
         CREATE (:Property {id: $family_id, site_id: $site_id, key: 'family', name: 'Family',
                 type: 'RelIsA', mode: 'Optional', rank: 4, inheritable: false, default: ''})
                -[:APPLIES_TO_TYPE]->(gt)
         CREATE (:Connection {id: $connection_id, site_id: $site_id, name: 'sync'})",
    )
    .param("site_id", fx.site_id.to_string())
    .param("type_id", EntryTypeId::new().to_string())
    .param("parent_id", fx.parent_id.to_string())
    .param("habitat_id", fx.habitat_id.to_string())
    .param("related_id", PropertyId::new().to_string())
    .param("status_id", fx.status_id.to_string())
    .param("genus_type_id", EntryTypeId::new().to_string())
    .param("family_id", PropertyId::new().to_string())
    .param("connection_id", fx.connection_id.to_string());
    client.run(q).await.unwrap();
    fx
}

async fn cleanup(client: &GraphClient, site_id: &SiteId) {
    let facts = neo4rs::query(
        "MATCH (:Entry {site_id: $sid})-[:PROP_FACT]->(pf:PropertyFact) DETACH DELETE pf",
    )
    .param("sid", site_id.to_string());
    let _ = client.run(facts).await;
    let nodes = neo4rs::query("MATCH (n) WHERE n.site_id = $sid OR (n:Site AND n.id = $sid) DETACH DELETE n")
        .param("sid", site_id.to_string());
    let _ = client.run(nodes).await;
}

async fn create_entry(engine: &EditEngine, fx: &Fixture, key: &str) -> EntryId {
    let entry_id = EntryId::new();
    let edit = Edit::CreateEntry(CreateEntry {
        entry_id,
        entry_type_key: "species".to_string(),
        key: key.to_string(),
        name: key.to_uppercase(),
        description: String::new(),
    });
    engine.apply_edits(&fx.site_id, &[edit]).await.unwrap();
    entry_id
}

fn add_fact(entry_id: EntryId, property_key: &str, value: ValueExpression) -> (PropertyFactId, Edit) {
    let fact_id = PropertyFactId::new();
    let edit = Edit::AddPropertyFact(AddPropertyFact {
        entry_id,
        property_key: property_key.to_string(),
        property_fact_id: fact_id,
        value_expression: value,
        note: String::new(),
        slot: String::new(),
        rank: None,
        weight: None,
    });
    (fact_id, edit)
}

async fn is_a(engine: &EditEngine, fx: &Fixture, child: EntryId, parent: EntryId) -> PropertyFactId {
    let (fact_id, edit) = add_fact(child, "parent", ValueExpression::entry(parent));
    engine.apply_edits(&fx.site_id, &[edit]).await.unwrap();
    fact_id
}

/// Number of IS_A edges between two entries, and how many of them a fact points at.
async fn is_a_edges(client: &GraphClient, from: EntryId, to: EntryId) -> (i64, i64) {
    let q = neo4rs::query(
        "MATCH (a:Entry {id: $from})-[rel:IS_A]->(b:Entry {id: $to})
         OPTIONAL MATCH (a)-[:PROP_FACT]->(pf:PropertyFact)
         WHERE pf.direct_rel_neo4j_id = id(rel)
         RETURN count(DISTINCT rel) AS edges, count(pf) AS tracked",
    )
    .param("from", from.to_string())
    .param("to", to.to_string());
    let row = client.query_one(q).await.unwrap().unwrap();
    (row.get("edges").unwrap(), row.get("tracked").unwrap())
}

/// Number of RELATES_TO edges between two entries.
async fn relates_to_edges(client: &GraphClient, from: EntryId, to: EntryId) -> i64 {
    let q = neo4rs::query(
        "MATCH (:Entry {id: $from})-[rel:RELATES_TO]->(:Entry {id: $to}) RETURN count(rel) AS n",
    )
    .param("from", from.to_string())
    .param("to", to.to_string());
    client.query_one(q).await.unwrap().unwrap().get("n").unwrap()
}

fn set_parents(entry_with: EntryLocator, property_key: &str, targets: &[EntryLocator]) -> BulkEdit {
    BulkEdit::SetRelationships(SetRelationships {
        entry_with,
        set: vec![RelationshipSet {
            property_key: property_key.to_string(),
            to_entries: targets
                .iter()
                .map(|t| RelationshipTarget {
                    entry_with: t.clone(),
                    note: String::new(),
                    slot: String::new(),
                })
                .collect(),
        }],
    })
}

fn invalid(err: EditError) -> InvalidEdit {
    match err {
        EditError::InvalidEdit(invalid) => invalid,
        other => panic!("expected an invalid edit, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires live Neo4j with APOC, run with: cargo test --package trellis-graph --test integration -- --ignored"]
async fn test_closest_ancestor_wins() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let a = create_entry(&engine, &fx, "a").await;
    let b = create_entry(&engine, &fx, "b").await;
    let c = create_entry(&engine, &fx, "c").await;
    is_a(&engine, &fx, c, b).await;
    is_a(&engine, &fx, b, a).await;

    let (_, far) = add_fact(a, "habitat", ValueExpression::Literal("forest".into()));
    let (near_id, near) = add_fact(b, "habitat", ValueExpression::Literal("wetland".into()));
    engine.apply_edits(&fx.site_id, &[far, near]).await.unwrap();

    let resolved = client
        .get_entry_property(&fx.site_id, &c, &fx.habitat_id, MAX_DEPTH)
        .await
        .unwrap()
        .expect("habitat should resolve");
    assert_eq!(resolved.facts.len(), 1);
    assert_eq!(resolved.facts[0].fact_id, near_id);
    assert_eq!(resolved.facts[0].source, FactSource::AncestorEntry { entry_id: b });

    // A property with only a default is still listed.
    let status = client
        .get_entry_property(&fx.site_id, &c, &fx.status_id, MAX_DEPTH)
        .await
        .unwrap()
        .expect("default should be visible");
    assert!(status.facts.is_empty());
    assert_eq!(status.property.default, "\"unknown\"");

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_ancestors_survive_cycles() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let a = create_entry(&engine, &fx, "a").await;
    let b = create_entry(&engine, &fx, "b").await;
    let c = create_entry(&engine, &fx, "c").await;
    let d = create_entry(&engine, &fx, "d").await;
    for (child, parent) in [(a, d), (d, b), (b, a), (d, c), (c, a)] {
        is_a(&engine, &fx, child, parent).await;
    }

    let ancestors = client.get_ancestors(&fx.site_id, &d, MAX_DEPTH).await.unwrap();
    let found: Vec<(u32, EntryId)> = ancestors.iter().map(|a| (a.distance, a.entry.id)).collect();
    assert_eq!(found, vec![(1, b), (1, c), (2, a)]);

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_delete_is_idempotent_and_removes_mirror() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let oak = create_entry(&engine, &fx, "oak").await;
    let tree = create_entry(&engine, &fx, "tree").await;
    let fact_id = is_a(&engine, &fx, oak, tree).await;
    assert_eq!(is_a_edges(&client, oak, tree).await, (1, 1));

    let delete = Edit::DeletePropertyFact(DeletePropertyFact {
        entry_id: oak,
        property_fact_id: fact_id,
    });
    let first = engine.apply_edits(&fx.site_id, &[delete.clone()]).await.unwrap();
    assert!(first[0].had_effect());
    assert_eq!(is_a_edges(&client, oak, tree).await, (0, 0));

    let second = engine.apply_edits(&fx.site_id, &[delete]).await.unwrap();
    assert_eq!(second, vec![EditResult::HadNoEffect]);

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_update_replaces_mirrored_edge() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let oak = create_entry(&engine, &fx, "oak").await;
    let tree = create_entry(&engine, &fx, "tree").await;
    let plant = create_entry(&engine, &fx, "plant").await;
    let fact_id = is_a(&engine, &fx, oak, tree).await;

    let update = Edit::UpdatePropertyFact(UpdatePropertyFact {
        property_fact_id: fact_id,
        entry_id: oak,
        value_expression: Some(ValueExpression::entry(plant)),
        note: None,
        rank: None,
        slot: None,
        weight: None,
    });
    engine.apply_edits(&fx.site_id, &[update]).await.unwrap();

    assert_eq!(is_a_edges(&client, oak, tree).await, (0, 0));
    assert_eq!(is_a_edges(&client, oak, plant).await, (1, 1));

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_failed_edit_rolls_back_batch() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let entry_id = EntryId::new();
    let create = Edit::CreateEntry(CreateEntry {
        entry_id,
        entry_type_key: "species".to_string(),
        key: "doomed".to_string(),
        name: "Doomed".to_string(),
        description: String::new(),
    });
    let (_, bad) = add_fact(entry_id, "no-such-property", ValueExpression::Literal("x".into()));

    let err = engine.apply_edits(&fx.site_id, &[create, bad]).await.unwrap_err();
    assert!(matches!(
        err,
        EditError::InvalidEdit(InvalidEdit::PropertyNotFound { .. })
    ));

    let q = neo4rs::query("MATCH (e:Entry {id: $id}) RETURN count(e) AS n")
        .param("id", entry_id.to_string());
    let row = client.query_one(q).await.unwrap().unwrap();
    assert_eq!(row.get::<i64>("n").unwrap(), 0);

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_set_relationships_converges() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let oak = create_entry(&engine, &fx, "oak").await;
    let tree = create_entry(&engine, &fx, "tree").await;
    let shrub = create_entry(&engine, &fx, "shrub").await;
    let shrub_fact = is_a(&engine, &fx, oak, shrub).await;

    let desired = vec![BulkEdit::SetRelationships(SetRelationships {
        entry_with: EntryLocator::Key("oak".to_string()),
        set: vec![RelationshipSet {
            property_key: "parent".to_string(),
            to_entries: vec![RelationshipTarget {
                entry_with: EntryLocator::Id(tree),
                note: String::new(),
                slot: String::new(),
            }],
        }],
    })];

    let first = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &desired)
        .await
        .unwrap();
    assert_eq!(first.connection_id, fx.connection_id);
    assert_eq!(first.outcome.applied_edits.len(), 2);
    assert!(first.outcome.applied_edits.iter().any(|e| matches!(
        e,
        Edit::DeletePropertyFact(d) if d.property_fact_id == shrub_fact
    )));
    assert_eq!(is_a_edges(&client, oak, tree).await, (1, 1));
    assert_eq!(is_a_edges(&client, oak, shrub).await, (0, 0));

    let second = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &desired)
        .await
        .unwrap();
    assert!(second.outcome.applied_edits.is_empty());

    // The target sees the relationship from the other side.
    let groups = client
        .get_entry_direct_relationship_facts(&fx.site_id, &tree, &RelationshipQuery::from_config(&EngineConfig::default()))
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].direction, RelDirection::To);
    assert_eq!(groups[0].property_id, fx.parent_id);
    assert_eq!(groups[0].total_count, 1);
    assert_eq!(groups[0].facts[0].entry.id, oak);

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_upsert_falls_back_to_set_on_create() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let upsert = vec![BulkEdit::UpsertEntryByKey(UpsertEntryByKey {
        where_: EntryKeyMatch {
            entry_type_key: "species".to_string(),
            entry_key: "s-quercus-alba".to_string(),
        },
        set: EntryFields::default(),
        set_on_create: EntryFields {
            name: Some("White oak".to_string()),
            description: None,
        },
    })];

    let first = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &upsert)
        .await
        .unwrap();
    let [Edit::CreateEntry(created)] = first.outcome.applied_edits.as_slice() else {
        panic!("expected one CreateEntry, got {:?}", first.outcome.applied_edits);
    };
    assert_eq!(created.name, "White oak");

    let second = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &upsert)
        .await
        .unwrap();
    assert!(second.outcome.applied_edits.is_empty());

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_unknown_connection_is_rejected() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let err = engine
        .apply_bulk(&fx.site_id, &ConnectionId::new(), &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EditError::InvalidEdit(InvalidEdit::ConnectionNotFound { .. })
    ));

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_add_with_missing_target_is_rejected() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let oak = create_entry(&engine, &fx, "oak").await;
    let ghost = EntryId::new();
    let (fact_id, edit) = add_fact(oak, "parent", ValueExpression::entry(ghost));

    let err = engine.apply_edits(&fx.site_id, &[edit]).await.unwrap_err();
    assert_eq!(
        invalid(err),
        InvalidEdit::RelationshipTargetNotFound {
            target: ghost.to_string()
        }
    );

    let q = neo4rs::query("MATCH (pf:PropertyFact {id: $id}) RETURN count(pf) AS n")
        .param("id", fact_id.to_string());
    let row = client.query_one(q).await.unwrap().unwrap();
    assert_eq!(row.get::<i64>("n").unwrap(), 0);

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_update_with_missing_target_keeps_old_fields() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let oak = create_entry(&engine, &fx, "oak").await;
    let tree = create_entry(&engine, &fx, "tree").await;
    let fact_id = is_a(&engine, &fx, oak, tree).await;

    let update = Edit::UpdatePropertyFact(UpdatePropertyFact {
        property_fact_id: fact_id,
        entry_id: oak,
        value_expression: Some(ValueExpression::entry(EntryId::new())),
        note: Some("moved".to_string()),
        rank: None,
        slot: None,
        weight: None,
    });
    let err = engine.apply_edits(&fx.site_id, &[update]).await.unwrap_err();
    assert!(matches!(invalid(err), InvalidEdit::RelationshipTargetNotFound { .. }));

    let q = neo4rs::query(
        "MATCH (pf:PropertyFact {id: $id}) RETURN pf.value_expression AS value, pf.note AS note",
    )
    .param("id", fact_id.to_string());
    let row = client.query_one(q).await.unwrap().unwrap();
    assert_eq!(row.get::<String>("value").unwrap(), ValueExpression::entry(tree).to_string());
    assert_eq!(row.get::<String>("note").unwrap(), "");
    assert_eq!(is_a_edges(&client, oak, tree).await, (1, 1));

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_related_fact_mirrors_one_relates_to_edge() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let oak = create_entry(&engine, &fx, "oak").await;
    let acorn = create_entry(&engine, &fx, "acorn").await;
    let (_, edit) = add_fact(oak, "related", ValueExpression::entry(acorn));
    engine.apply_edits(&fx.site_id, &[edit]).await.unwrap();

    assert_eq!(relates_to_edges(&client, oak, acorn).await, 1);
    assert_eq!(is_a_edges(&client, oak, acorn).await, (0, 0));

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_set_relationships_rejects_unknown_entry_with_empty_set() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let edit = BulkEdit::SetRelationships(SetRelationships {
        entry_with: EntryLocator::Key("no-such-key".to_string()),
        set: vec![],
    });
    let err = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &[edit])
        .await
        .unwrap_err();
    assert_eq!(
        invalid(err),
        InvalidEdit::OutcomeCountMismatch {
            operation: "SetRelationships",
            expected: 1,
            actual: 0,
        }
    );

    cleanup(&client, &fx.site_id).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_set_relationships_rejects_unusable_properties() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let engine = EditEngine::new(client.clone());
    let fx = seed(&client).await;

    let oak = create_entry(&engine, &fx, "oak").await;
    let tree = create_entry(&engine, &fx, "tree").await;
    let targets = [EntryLocator::Id(tree)];

    let value_typed = set_parents(EntryLocator::Id(oak), "habitat", &targets);
    let err = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &[value_typed])
        .await
        .unwrap_err();
    assert_eq!(
        invalid(err),
        InvalidEdit::NotARelationshipProperty {
            property_key: "habitat".to_string()
        }
    );

    let other_type = set_parents(EntryLocator::Id(oak), "family", &targets);
    let err = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &[other_type])
        .await
        .unwrap_err();
    assert_eq!(
        invalid(err),
        InvalidEdit::PropertyNotApplicable {
            property_key: "family".to_string(),
            entry_type_key: "species".to_string(),
        }
    );

    let missing_target = set_parents(
        EntryLocator::Id(oak),
        "parent",
        &[EntryLocator::Key("no-such-key".to_string())],
    );
    let err = engine
        .apply_bulk(&fx.site_id, &fx.connection_id, &[missing_target])
        .await
        .unwrap_err();
    assert_eq!(
        invalid(err),
        InvalidEdit::RelationshipTargetNotFound {
            target: "no-such-key".to_string()
        }
    );
    assert_eq!(is_a_edges(&client, oak, tree).await, (0, 0));

    cleanup(&client, &fx.site_id).await;
}
