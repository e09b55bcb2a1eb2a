//! End-to-end frames against the recording device.

use std::fs;
use std::path::PathBuf;

use strata_engine::coords::{Rect, Vec2};
use strata_engine::device::{
    BufferRole, DeviceCall, RecordingDevice, ScissorRect, UniformValue,
};
use strata_engine::paint::{Bitmap, Color, Pen};
use strata_engine::text::{FontDescriptor, FontLibrary, FntFile};
use strata_engine::{FrameStats, Graphic, GraphicConfig, GraphicError};

const FONT: &str = "textures: atlas.png\n\
Mock 10pt\n\
65\t0\t0\t8\t8\t0\t1\t8\t12\n\
66\t8\t0\t8\t8\t0\t1\t8\t12\n\
kerning pairs:\n\
65\t66\t-2\n\
Mock 10pt bold\n\
65\t0\t8\t8\t8\t0\t1\t9\t12\n";

fn fonts() -> FontLibrary {
    let file = FntFile::parse(FONT).unwrap();
    FontLibrary::from_faces(file.into_faces(Bitmap::solid(16, 16, [255; 4])))
}

fn graphic(width: f32, height: f32, scale: f32) -> Graphic<RecordingDevice> {
    let config = GraphicConfig::default().with_surface(width, height, scale);
    Graphic::new(RecordingDevice::new(), Box::new(fonts()), config).unwrap()
}

fn buffer_writes(g: &Graphic<RecordingDevice>) -> usize {
    g.device()
        .count_calls(|c| matches!(c, DeviceCall::WriteBuffer { .. }))
}

#[test]
fn mixed_frame_replays_in_order() {
    let mut g = graphic(200.0, 200.0, 1.0);
    let img = Bitmap::solid(4, 4, [255, 0, 0, 255]);

    g.fill_rectangle(Color::WHITE, Rect::new(0.0, 0.0, 200.0, 200.0)).unwrap();
    g.draw_line(Pen::new(Color::BLACK, 3.0), Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0)).unwrap();
    g.draw_image(&img, Rect::new(10.0, 10.0, 20.0, 20.0)).unwrap();
    g.set_clip(Rect::new(5.0, 5.0, 100.0, 50.0)).unwrap();
    g.draw_ellipse(Pen::new(Color::BLACK, 2.0), Rect::new(0.0, 0.0, 40.0, 20.0)).unwrap();
    g.draw_string("AB", &FontDescriptor::new("Mock", 10.0), Color::BLACK, Vec2::zero()).unwrap();
    g.draw_rectangle(Pen::hairline(Color::BLACK), Rect::new(1.0, 1.0, 5.0, 5.0)).unwrap();

    let stats = g.render().unwrap();
    assert_eq!(stats, FrameStats { actions: 7, draws: 9, failed_draws: 0 });

    let draws = g.device().last_frame_draws();
    let labels: Vec<&str> = draws.iter().map(|d| d.program_label.as_str()).collect();
    assert_eq!(
        labels,
        [
            "polygon", "polygon", "image", "ellipse", "text", "polygon", "polygon", "polygon",
            "polygon"
        ]
    );
    // The clip applies from the ellipse on.
    assert_eq!(draws[2].scissor, None);
    let clip = Some(ScissorRect { x: 5, y: 145, width: 100, height: 50 });
    assert!(draws[3..].iter().all(|d| d.scissor == clip));

    // Line quad from the pen convention.
    let line = draws[1].points("position");
    assert_eq!(line[0], [0.0, 4.0]);
    assert_eq!(line[2], [10.0, 6.0]);

    // Kerned text: B starts at 8 - 2.
    let text = draws[4].points("position");
    assert_eq!(text[6], [6.0, 1.0]);
}

#[test]
fn each_batcher_uploads_once_per_frame() {
    let mut g = graphic(100.0, 100.0, 1.0);
    for i in 0..50 {
        g.fill_rectangle(Color::WHITE, Rect::new(i as f32, 0.0, 1.0, 1.0)).unwrap();
    }
    g.fill_ellipse(Color::WHITE, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();

    let before = buffer_writes(&g);
    g.render().unwrap();
    // polygon + ellipse; image and text batchers are empty
    assert_eq!(buffer_writes(&g) - before, 2);
}

#[test]
fn buffers_grow_and_keep_drawing() {
    let config = GraphicConfig { initial_buffer_bytes: 64, ..GraphicConfig::default() };
    let mut g = Graphic::new(RecordingDevice::new(), Box::new(fonts()), config).unwrap();

    g.fill_rectangle(Color::WHITE, Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
    g.render().unwrap();

    for i in 0..40 {
        g.fill_rectangle(Color::BLACK, Rect::new(i as f32, 2.0, 1.0, 1.0)).unwrap();
    }
    let stats = g.render().unwrap();
    assert_eq!(stats.draws, 40);
    assert_eq!(stats.failed_draws, 0);

    let last = g.device().last_frame_draws();
    let p = last[39].points("position");
    assert_eq!(p[0], [39.0, 2.0]);
    // 40 quads of 6 vertices of 24 bytes
    let grown = g
        .device()
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::CreateBuffer { role: BufferRole::Position, size, .. } => Some(*size),
            _ => None,
        })
        .max()
        .unwrap();
    assert!(grown >= 40 * 6 * 24);
}

#[test]
fn scale_affects_surface_and_scissor() {
    let mut g = graphic(100.0, 100.0, 2.0);
    assert_eq!(g.device().surface_size(), (200, 200));
    g.set_clip(Rect::new(10.0, 10.0, 20.0, 30.0)).unwrap();
    g.fill_rectangle(Color::WHITE, Rect::new(0.0, 0.0, 5.0, 5.0)).unwrap();
    g.render().unwrap();
    assert_eq!(
        g.device().last_frame_draws()[0].scissor,
        Some(ScissorRect { x: 20, y: 120, width: 40, height: 60 })
    );
}

#[test]
fn bold_request_matches_bold_face() {
    let mut g = graphic(100.0, 100.0, 1.0);
    g.draw_string("A", &FontDescriptor::new("mock", 10.0).bold(), Color::BLACK, Vec2::zero())
        .unwrap();
    g.render().unwrap();
    let uv = g.device().last_frame_draws()[0].points("texcoord");
    // bold 'A' sits on the second atlas row
    assert_eq!(uv[0], [0.0, 0.5]);
}

#[test]
fn frames_are_independent() {
    let mut g = graphic(100.0, 100.0, 1.0);
    g.fill_rectangle(Color::WHITE, Rect::new(0.0, 0.0, 5.0, 5.0)).unwrap();
    g.render().unwrap();
    let stats = g.render().unwrap();
    assert_eq!(stats, FrameStats::default());
    assert_eq!(g.device().frames(), 2);
}

#[test]
fn font_directory_round_trip() {
    let dir: PathBuf = std::env::temp_dir().join(format!("strata-it-fonts-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    image::RgbaImage::from_pixel(16, 16, image::Rgba([255, 255, 255, 255]))
        .save(dir.join("atlas.png"))
        .unwrap();
    fs::write(dir.join("mock.fnt"), FONT).unwrap();

    let lib = FontLibrary::load_dir(&dir).unwrap();
    let mut g =
        Graphic::new(RecordingDevice::new(), Box::new(lib), GraphicConfig::default()).unwrap();
    let size = g.measure_string("AB", &FontDescriptor::new("Mock", 10.0)).unwrap();
    assert_eq!(size, Vec2::new(14.0, 12.0));
    g.draw_string("AB", &FontDescriptor::new("Mock", 10.0), Color::BLACK, Vec2::zero()).unwrap();
    assert_eq!(g.render().unwrap().draws, 1);
    fs::remove_dir_all(&dir).unwrap();

    let err = FontLibrary::load_dir(&dir).unwrap_err();
    assert!(matches!(err, GraphicError::Io(_)));
}

#[test]
fn edited_bitmaps_keep_their_own_textures() {
    let mut g = graphic(100.0, 100.0, 1.0);
    let mut red = Bitmap::solid(2, 2, [0; 4]);
    let mut blue = Bitmap::solid(2, 2, [0; 4]);
    red.pixels_mut().copy_from_slice(&[255, 0, 0, 255].repeat(4));
    blue.pixels_mut().copy_from_slice(&[0, 0, 255, 255].repeat(4));

    g.draw_image(&red, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    g.draw_image(&blue, Rect::new(20.0, 0.0, 10.0, 10.0)).unwrap();
    g.render().unwrap();

    let textures: Vec<_> = g.device().last_frame_draws().iter().map(|d| d.texture).collect();
    assert_eq!(textures.len(), 2);
    assert!(textures.iter().all(Option::is_some));
    assert_ne!(textures[0], textures[1]);
}

#[test]
fn ellipse_edges_follow_the_scale_factor() {
    let mut g = graphic(100.0, 100.0, 2.0);
    g.fill_ellipse(Color::WHITE, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    g.render().unwrap();
    g.resize(100.0, 100.0, 1.5).unwrap();
    g.fill_ellipse(Color::WHITE, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    g.render().unwrap();

    let scales: Vec<_> = g
        .device()
        .draws()
        .map(|d| d.uniform("scale").copied())
        .collect();
    assert_eq!(
        scales,
        vec![Some(UniformValue::Float(2.0)), Some(UniformValue::Float(1.5))]
    );
}
