//! Matching shipped binaries against analyzed releases

mod helper;

use std::path::Path;

use mockito::Server;
use tempfile::TempDir;

use upm_fingerprint::cancel::CancellationToken;
use upm_fingerprint::compare::ranking::format_line;
use upm_fingerprint::compare::{CompareStrategy, StrategyKind};
use upm_fingerprint::extract::attributes::{field_attributes, method_attributes, type_attributes};
use upm_fingerprint::extract::metadata::{
    FieldDefinition, InheritedType, MethodDefinition, ParameterDefinition, TypeDefinition,
    TypeSignature,
};
use upm_fingerprint::extract::{
    AssemblyExtractor, AssemblyMetadata, JsonMetadataLoader, ParsedSource, SourceExtractor,
    StructuralExtractor,
};
use upm_fingerprint::fingerprint::{Fingerprint, FsFingerprintCache};
use upm_fingerprint::orchestrator::MatchOrchestrator;
use upm_fingerprint::registry::UnityRegistry;
use upm_fingerprint::version::{HostVersion, VersionToken};

use helper::fixture::{test_config, write_file};
use helper::registry::{ReleaseFixture, serve_package};

fn from_source(version: &str, files: &[&str]) -> Fingerprint {
    let mut fingerprint = Fingerprint::new(
        "com.unity.sample",
        VersionToken::parse(version).unwrap(),
        HostVersion::MIN,
    );
    let extractor = SourceExtractor::new();
    for (i, content) in files.iter().enumerate() {
        let parsed = ParsedSource::parse(format!("File{}.cs", i), content, None).unwrap();
        extractor.extract_into(&parsed, &mut fingerprint).unwrap();
    }
    fingerprint
}

fn system(name: &str) -> TypeSignature {
    TypeSignature::named("System", name)
}

fn class_type(name: &str, attributes: u32) -> TypeDefinition {
    TypeDefinition {
        name: name.to_string(),
        namespace: "Sample".to_string(),
        attributes,
        base_type: Some(InheritedType {
            signature: system("Object"),
            implemented_interfaces: vec![],
        }),
        ..TypeDefinition::default()
    }
}

/// Metadata of `Sample.Widget { public int Size; public void Resize(int size); }`
fn widget_metadata() -> AssemblyMetadata {
    let mut widget = class_type("Widget", type_attributes::PUBLIC);
    widget.fields = vec![FieldDefinition {
        name: "Size".to_string(),
        attributes: method_attributes::PUBLIC,
        field_type: system("Int32"),
    }];
    widget.methods = vec![
        MethodDefinition {
            name: ".ctor".to_string(),
            attributes: method_attributes::PUBLIC
                | method_attributes::SPECIAL_NAME
                | method_attributes::RT_SPECIAL_NAME,
            generic_parameters: vec![],
            return_type: system("Void"),
            parameters: vec![],
        },
        MethodDefinition {
            name: "Resize".to_string(),
            attributes: method_attributes::PUBLIC,
            generic_parameters: vec![],
            return_type: system("Void"),
            parameters: vec![ParameterDefinition {
                name: "size".to_string(),
                parameter_type: system("Int32"),
                is_out: false,
            }],
        },
    ];
    AssemblyMetadata {
        name: "Unity.Sample".to_string(),
        types: vec![widget],
    }
}

#[test]
fn missing_setter_lowers_but_does_not_zero_the_score() {
    let shipped = from_source(
        "0.0.0",
        &["namespace Sample { public class Widget { public int Size { get; } } }"],
    );
    let release = from_source(
        "1.0.0",
        &["namespace Sample { public class Widget { public int Size { get; set; } } }"],
    );

    let score = StrategyKind::Balanced
        .strategy()
        .compare(&shipped, &release)
        .unwrap();

    assert!(score > 0.0 && score < 1.0, "score was {score}");
}

#[test]
fn private_field_type_change_is_invisible() {
    let shipped = from_source("0.0.0", &["class Holder { private int X; }"]);
    let release = from_source("1.0.0", &["class Holder { private string X; }"]);

    let score = StrategyKind::Balanced
        .strategy()
        .compare(&shipped, &release)
        .unwrap();

    assert_eq!(score, 1.0);
}

#[test]
fn nested_types_share_names_across_inputs() {
    let mut outer = class_type("Outer", type_attributes::PUBLIC);
    outer.fields = vec![FieldDefinition {
        name: "Count".to_string(),
        attributes: method_attributes::PUBLIC | field_attributes::STATIC,
        field_type: system("Int32"),
    }];
    let mut inner = class_type("Inner", type_attributes::NESTED_PUBLIC);
    inner.namespace = String::new();
    inner.declaring_type = Some(0);
    let metadata = AssemblyMetadata {
        name: "Unity.Sample".to_string(),
        types: vec![outer, inner],
    };
    let shipped = AssemblyExtractor::new().extract("com.unity.sample", &metadata);

    let release = from_source(
        "1.0.0",
        &["namespace Sample { public class Outer { public static int Count; public class Inner { } } }"],
    );

    assert_eq!(shipped.classes["Outer.Inner"].namespace, "Sample");
    assert_eq!(release.classes["Outer.Inner"].namespace, "Sample");
    for strategy in [StrategyKind::Balanced, StrategyKind::Equal] {
        let score = strategy.strategy().compare(&shipped, &release).unwrap();
        assert!((score - 1.0).abs() < 1e-9, "{strategy:?} scored {score}");
    }
}

fn write_binary(managed: &Path, name: &str, metadata: &AssemblyMetadata) {
    let binary = managed.join(name);
    std::fs::create_dir_all(managed).unwrap();
    std::fs::write(&binary, b"MZ").unwrap();
    std::fs::write(
        JsonMetadataLoader::dump_path(&binary),
        serde_json::to_string(metadata).unwrap(),
    )
    .unwrap();
}

#[tokio::test]
async fn run_ranks_the_matching_release_first() {
    let mut server = Server::new_async().await;
    let served = serve_package(
        &mut server,
        "com.unity.sample",
        &[
            ReleaseFixture {
                version: "1.0.0",
                unity: "2020.1",
                files: vec![(
                    "package/Runtime/Widget.cs",
                    "namespace Sample { public class Widget { public int Size; } }",
                )],
                downloads: 1,
            },
            ReleaseFixture {
                version: "1.1.0",
                unity: "2020.1",
                files: vec![
                    (
                        "package/Runtime/Widget.cs",
                        "namespace Sample { public class Widget { public int Size; public void Resize(int size) { } } }",
                    ),
                    (
                        "package/Editor/WidgetEditor.cs",
                        "namespace Sample.Editor { public class WidgetEditor { } }",
                    ),
                ],
                downloads: 1,
            },
            ReleaseFixture {
                version: "2.0.0",
                unity: "2023.1",
                files: vec![],
                downloads: 0,
            },
        ],
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir.path().join("data"), &server.url());
    let managed = dir.path().join("Game_Data").join("Managed");
    write_binary(&managed, "Unity.Sample.dll", &widget_metadata());
    // Not a package binary
    write_file(&managed, "Assembly-CSharp.dll", "MZ");

    let registry = UnityRegistry::new(&config.registry_url, config.registry_cache_dir()).unwrap();
    let cache = FsFingerprintCache::new(config.fingerprint_dir());
    let loader = JsonMetadataLoader;
    let strategy = StrategyKind::Balanced.strategy();
    let orchestrator = MatchOrchestrator::new(
        &registry,
        &cache,
        &loader,
        strategy.as_ref(),
        &config,
        CancellationToken::new(),
    );
    let host = HostVersion::parse("2021.3.5f1").unwrap();

    let matches = orchestrator.run(&managed, &host).await.unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(
        format_line(&matches[0].package_id, &matches[0].ranked),
        "com.unity.sample: 1.1.0 (100.000 %) -> 1.0.0 (50.000 %)"
    );

    // A second run is served entirely from the caches
    let again = orchestrator.run(&managed, &host).await.unwrap();
    assert_eq!(again, matches);
    served.assert().await;
}
