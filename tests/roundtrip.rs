mod common;

use std::rc::Rc;

use rstest::rstest;
use xbf::encode::{PropertyName, TypeName};
use xbf::tables::SymbolIndex;
use xbf::token::GridUnit;
use xbf::{
    FormatVersion, LineInfo, LoadOptions, StringMode, Token, TokenList, Value, WriteOptions,
    XbfWriter,
};

use common::{app_type, context, controls, shared, CountingSchema, HASH};

fn values() -> Vec<Value> {
    vec![
        Value::Bool(true),
        Value::Float(0.5),
        Value::Int(-42),
        Value::String("Hello".into()),
        Value::Color(0xFF336699),
        Value::Thickness {
            left: 1.0,
            top: 2.0,
            right: 3.0,
            bottom: 4.5,
        },
        Value::GridLength {
            value: 2.0,
            unit: GridUnit::Star,
        },
        Value::GridLength {
            value: 1.0,
            unit: GridUnit::Auto,
        },
    ]
}

fn document(version: FormatVersion, stable: bool) -> Vec<u8> {
    let options = WriteOptions::new()
        .with_version(version)
        .with_stable_indices(stable);
    let mut writer = XbfWriter::new(options);
    writer.line_info(1, 1);
    writer.namespace("", xbf::constants::PRESENTATION_NAMESPACE);
    writer.namespace("x", xbf::constants::DIRECTIVES_NAMESPACE);
    writer.start_object(&controls("StackPanel"));
    writer.start_member(&PropertyName::directive("Uid"), false);
    writer.text("Panel");
    writer.end_member();
    writer.end_of_attributes();
    writer.line_info(3, 5);
    writer.start_member(&PropertyName::new(app_type("Holder"), "Items"), true);
    for value in values() {
        writer.value(&value);
    }
    writer.line_info(12, 9);
    writer.start_object(&controls("Button"));
    writer.end_object();
    writer.text("tail");
    writer.end_member();
    writer.end_object();
    writer.finish(&HASH).expect("write document")
}

fn decode(bytes: Vec<u8>, options: &LoadOptions) -> TokenList {
    let (ctx, reporter) = context(Rc::new(CountingSchema::new()));
    let options = options.clone().with_validate_grammar(true);
    let tokens = xbf::decode_with_options(bytes, &ctx, &options).expect("decode document");
    assert!(reporter.is_empty(), "{:?}", reporter.reports());
    tokens
}

#[rstest]
#[case(FormatVersion::V1, true)]
#[case(FormatVersion::V2, true)]
#[case(FormatVersion::V2_1, true)]
#[case(FormatVersion::V2_1, false)]
fn roundtrip_preserves_tokens(#[case] version: FormatVersion, #[case] stable: bool) {
    let tokens = decode(document(version, stable), &LoadOptions::default());
    let kinds: Vec<&str> = tokens.iter().map(|node| node.token.kind_name()).collect();
    let mut expected = vec![
        "Namespace",
        "Namespace",
        "StartObject",
        "StartMember",
        "Text",
        "EndMember",
        "EndOfAttributes",
        "StartMember",
    ];
    expected.extend(std::iter::repeat("Value").take(values().len()));
    expected.extend([
        "StartObject",
        "EndObject",
        "Text",
        "EndMember",
        "EndObject",
        "EndOfStream",
    ]);
    assert_eq!(kinds, expected);

    let decoded_values: Vec<Value> = tokens
        .iter()
        .filter_map(|node| match &node.token {
            Token::Value(value) => Some(value.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(decoded_values, values());

    let Token::Namespace { prefix, namespace } = &tokens.nodes()[1].token else {
        panic!("expected namespace");
    };
    assert_eq!(prefix, "x");
    assert_eq!(namespace.uri, xbf::constants::DIRECTIVES_NAMESPACE);

    let Token::StartObject(panel) = &tokens.nodes()[2].token else {
        panic!("expected start object");
    };
    assert_eq!(panel.name, "StackPanel");
    assert_eq!(panel.namespace_name(), "Microsoft.UI.Xaml.Controls");
    assert_eq!(panel.index.is_trusted(), stable);

    let Token::StartMember {
        property,
        multi_item,
    } = &tokens.nodes()[7].token
    else {
        panic!("expected start member");
    };
    assert!(*multi_item);
    assert_eq!(property.name, "Items");
    let owner = property.declaring_type.as_ref().expect("declaring type");
    assert_eq!(owner.to_string(), "App.Views.Holder");
}

#[rstest]
fn roundtrip_tracks_lines() {
    let tokens = decode(document(FormatVersion::V2_1, true), &LoadOptions::default());
    let nodes = tokens.nodes();
    assert_eq!(nodes[0].line, LineInfo::new(1, 1));
    assert_eq!(nodes[7].line, LineInfo::new(3, 5));
    let button = nodes
        .iter()
        .position(|node| matches!(&node.token, Token::StartObject(ty) if ty.name == "Button"))
        .expect("button");
    assert_eq!(nodes[button].line, LineInfo::new(12, 9));
}

#[rstest]
fn stable_types_skip_the_type_table() {
    let tokens = decode(document(FormatVersion::V2_1, true), &LoadOptions::default());
    let Token::StartObject(button) = &tokens
        .iter()
        .find(|node| matches!(&node.token, Token::StartObject(ty) if ty.name == "Button"))
        .expect("button")
        .token
    else {
        unreachable!();
    };
    assert!(matches!(button.index, SymbolIndex::Stable(7)));
}

#[rstest]
#[case(StringMode::View)]
#[case(StringMode::Owned)]
fn string_modes_decode_the_same_text(#[case] mode: StringMode) {
    let options = LoadOptions::new().with_string_mode(mode);
    let tokens = decode(document(FormatVersion::V2_1, false), &options);
    let texts: Vec<String> = tokens
        .iter()
        .filter_map(|node| match &node.token {
            Token::Text(text) => Some(text.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, ["Panel", "tail"]);
    let views = tokens
        .iter()
        .filter(|node| matches!(&node.token, Token::Text(text) if text.is_view()))
        .count();
    assert_eq!(views > 0, mode == StringMode::View);
}

#[rstest]
fn directive_types_roundtrip() {
    let mut writer = XbfWriter::new(WriteOptions::default());
    writer.start_object(&TypeName::directive("String"));
    writer.start_member(&PropertyName::directive("Key"), false);
    writer.text("greeting");
    writer.end_member();
    writer.end_object();
    let bytes = writer.finish(&HASH).expect("write");
    let (ctx, _) = context(Rc::new(CountingSchema::new()));
    let tokens = xbf::decode(shared(bytes), &ctx).expect("decode");

    let Token::StartObject(ty) = &tokens.nodes()[0].token else {
        panic!("expected start object");
    };
    assert!(ty.is_directive());
    assert_eq!(ty.to_string(), "x:String");
    let Token::StartMember { property, .. } = &tokens.nodes()[1].token else {
        panic!("expected start member");
    };
    assert_eq!(property.to_string(), "x:Key");
}
