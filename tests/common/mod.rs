#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::time::Instant;

use u3m_viewer::engine::Engine;
use u3m_viewer::io::MemoryFetcher;
use u3m_viewer::renderer::HeadlessBackend;
use u3m_viewer::settings::ViewerSettings;

pub type TestEngine = Engine<HeadlessBackend, MemoryFetcher>;

/// Builds an in-memory zip with deflated entries.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// A GLB with one triangle mesh instanced by `nodes` nodes, each shifted along x.
pub fn triangle_glb(nodes: usize) -> Vec<u8> {
    tinted_triangle_glb(nodes, None)
}

/// Like [`triangle_glb`], with a metallic-roughness material of `base_color` when given.
pub fn tinted_triangle_glb(nodes: usize, base_color: Option<[f32; 4]>) -> Vec<u8> {
    let mut bin = Vec::new();
    for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        for c in p {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let node_json: Vec<String> = (0..nodes)
        .map(|i| format!(r#"{{"mesh":0,"translation":[{}.0,0.0,0.0]}}"#, i * 2))
        .collect();
    let node_refs: Vec<String> = (0..nodes).map(|i| i.to_string()).collect();

    let (primitive_material, materials) = match base_color {
        Some([r, g, b, a]) => (
            r#","material":0"#.to_string(),
            format!(
                r#""materials":[{{"name":"Paint","pbrMetallicRoughness":{{"baseColorFactor":[{},{},{},{}],"metallicFactor":0.0,"roughnessFactor":0.4}}}}],"#,
                r, g, b, a
            ),
        ),
        None => (String::new(), String::new()),
    };

    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[{}]}}],"nodes":[{}],
"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1{}}}]}}],{}
"buffers":[{{"byteLength":{}}}],
"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],
"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},
{{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#,
        node_refs.join(","),
        node_json.join(","),
        primitive_material,
        materials,
        bin.len()
    );
    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

pub fn headless_engine(fetcher: MemoryFetcher, now: Instant) -> TestEngine {
    u3m_viewer::init_logging();
    Engine::new(
        HeadlessBackend::new(),
        fetcher,
        ViewerSettings::default(),
        now,
    )
}

/// Ticks until the loader queue is empty.
pub fn drain_loads(engine: &mut TestEngine, now: Instant) {
    while engine.has_pending_loads() {
        engine.tick(now);
    }
}
