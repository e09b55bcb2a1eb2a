//! WGSL front end shared by the devices.
//!
//! "Compiling" a stage parses and validates it with naga and extracts the
//! interface the GL-style device model needs: the uniform block at
//! `@group(0) @binding(0)`, the located entry-point inputs and outputs, and
//! whether the stage samples a texture.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Module, ScalarKind, TypeInner, VectorSize};

use super::{ShaderStage, UniformValue};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Group holding the uniform block.
pub const UNIFORM_GROUP: u32 = 0;
/// Group holding `texture_2d` at binding 0 and its sampler at binding 1.
pub const TEXTURE_GROUP: u32 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec4,
    Mat4,
}

impl UniformKind {
    pub fn accepts(self, value: &UniformValue) -> bool {
        matches!(
            (self, value),
            (UniformKind::Float, UniformValue::Float(_))
                | (UniformKind::Int, UniformValue::Int(_))
                | (UniformKind::Vec2, UniformValue::Vec2(_))
                | (UniformKind::Vec4, UniformValue::Vec4(_))
                | (UniformKind::Mat4, UniformValue::Mat4(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformField {
    pub name: String,
    pub offset: u32,
    /// Bytes up to the next member (or the end of the block).
    pub size: u32,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageInput {
    pub name: String,
    pub location: u32,
    pub components: u8,
}

#[derive(Debug, Clone)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub uniforms: Vec<UniformField>,
    pub uniform_block_size: u32,
    pub inputs: Vec<StageInput>,
    pub outputs: Vec<u32>,
    pub samples_texture: bool,
    pub module: Module,
}

/// Interface of a linked program.
#[derive(Debug, Clone, Default)]
pub struct ProgramLayout {
    pub uniforms: Vec<UniformField>,
    pub block_size: u32,
    pub attributes: Vec<StageInput>,
    pub samples_texture: bool,
}

impl ProgramLayout {
    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|u| u.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&StageInput> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Parses, validates and reflects one stage.
pub fn reflect_stage(stage: ShaderStage, source: &str) -> Result<StageReflection, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let entry_name = match stage {
        ShaderStage::Vertex => VERTEX_ENTRY,
        ShaderStage::Fragment => FRAGMENT_ENTRY,
    };
    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_name && ep.stage == wanted)
        .ok_or_else(|| format!("missing {stage} entry point `{entry_name}`"))?;

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_located(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }

    let mut outputs = Vec::new();
    if stage == ShaderStage::Vertex {
        if let Some(result) = &entry.function.result {
            let mut located = Vec::new();
            collect_located(&module, None, result.ty, result.binding.as_ref(), &mut located);
            outputs = located.into_iter().map(|i| i.location).collect();
        }
    }

    let mut uniforms = Vec::new();
    let mut uniform_block_size = 0;
    let mut samples_texture = false;

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else { continue };
        let inner = &module.types[global.ty].inner;

        if global.space == AddressSpace::Uniform
            && binding.group == UNIFORM_GROUP
            && binding.binding == 0
        {
            let TypeInner::Struct { members, span } = inner else {
                return Err("uniform block must be a struct".to_string());
            };
            uniform_block_size = *span;
            for (i, member) in members.iter().enumerate() {
                let end = members.get(i + 1).map_or(*span, |next| next.offset);
                let Some(kind) = uniform_kind(&module.types[member.ty].inner) else {
                    return Err(format!(
                        "uniform `{}` has an unsupported type",
                        member.name.as_deref().unwrap_or("?")
                    ));
                };
                uniforms.push(UniformField {
                    name: member.name.clone().unwrap_or_default(),
                    offset: member.offset,
                    size: end - member.offset,
                    kind,
                });
            }
        } else if binding.group == TEXTURE_GROUP && matches!(inner, TypeInner::Image { .. }) {
            samples_texture = true;
        }
    }

    Ok(StageReflection {
        stage,
        uniforms,
        uniform_block_size,
        inputs,
        outputs,
        samples_texture,
        module,
    })
}

/// Checks that the stages agree and merges their interfaces.
pub fn link(vertex: &StageReflection, fragment: &StageReflection) -> Result<ProgramLayout, String> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err("link expects a vertex and a fragment stage".to_string());
    }

    for input in &fragment.inputs {
        if !vertex.outputs.contains(&input.location) {
            return Err(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            ));
        }
    }

    let mut uniforms = vertex.uniforms.clone();
    for field in &fragment.uniforms {
        match uniforms.iter().find(|u| u.name == field.name) {
            Some(existing) if existing.offset != field.offset || existing.kind != field.kind => {
                return Err(format!("uniform `{}` differs between stages", field.name));
            }
            Some(_) => {}
            None => uniforms.push(field.clone()),
        }
    }

    Ok(ProgramLayout {
        uniforms,
        block_size: vertex.uniform_block_size.max(fragment.uniform_block_size),
        attributes: vertex.inputs.clone(),
        samples_texture: vertex.samples_texture || fragment.samples_texture,
    })
}

fn collect_located(
    module: &Module,
    name: Option<&str>,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<StageInput>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::Location { location, .. }) => out.push(StageInput {
            name: name.unwrap_or_default().to_string(),
            location: *location,
            components: components_of(inner),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for member in members {
                    collect_located(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn components_of(inner: &TypeInner) -> u8 {
    match inner {
        TypeInner::Vector { size, .. } => *size as u8,
        _ => 1,
    }
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match inner {
        TypeInner::Scalar(s) if s.kind == ScalarKind::Float => Some(UniformKind::Float),
        TypeInner::Scalar(s) if s.kind == ScalarKind::Sint => Some(UniformKind::Int),
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => Some(UniformKind::Vec2),
            VectorSize::Quad => Some(UniformKind::Vec4),
            VectorSize::Tri => None,
        },
        TypeInner::Matrix { columns: VectorSize::Quad, rows: VectorSize::Quad, .. } => {
            Some(UniformKind::Mat4)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"
struct Globals {
    projection: mat4x4<f32>,
    tint: vec4<f32>,
    width: f32,
};
@group(0) @binding(0) var<uniform> globals: Globals;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) vertex_color: vec4<f32>) -> VsOut {
    var out: VsOut;
    out.clip = globals.projection * vec4<f32>(position, 0.0, 1.0);
    out.color = vertex_color * globals.tint * globals.width;
    return out;
}
"#;

    const FS: &str = r#"
struct Globals {
    projection: mat4x4<f32>,
    tint: vec4<f32>,
    width: f32,
};
@group(0) @binding(0) var<uniform> globals: Globals;

@fragment
fn fs_main(@location(0) color: vec4<f32>) -> @location(0) vec4<f32> {
    return color * globals.tint;
}
"#;

    // ── stage reflection ─────────────────────────────────────────────────

    #[test]
    fn vertex_stage_interface() {
        let vs = reflect_stage(ShaderStage::Vertex, VS).unwrap();
        let names: Vec<_> =
            vs.inputs.iter().map(|i| (i.name.as_str(), i.location, i.components)).collect();
        assert_eq!(names, vec![("position", 0, 2), ("vertex_color", 1, 4)]);
        assert_eq!(vs.outputs, vec![0]);

        let proj = &vs.uniforms[0];
        assert_eq!(
            (proj.name.as_str(), proj.offset, proj.kind),
            ("projection", 0, UniformKind::Mat4)
        );
        let width = vs.uniforms.iter().find(|u| u.name == "width").unwrap();
        assert_eq!(width.offset, 80);
        assert_eq!(width.kind, UniformKind::Float);
        assert!(!vs.samples_texture);
    }

    #[test]
    fn syntax_errors_carry_a_log() {
        let err = reflect_stage(ShaderStage::Vertex, "fn vs_main( {").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let err = reflect_stage(ShaderStage::Vertex, FS).unwrap_err();
        assert!(err.contains("vs_main"));
    }

    // ── linking ──────────────────────────────────────────────────────────

    #[test]
    fn link_merges_uniforms() {
        let vs = reflect_stage(ShaderStage::Vertex, VS).unwrap();
        let fs = reflect_stage(ShaderStage::Fragment, FS).unwrap();
        let layout = link(&vs, &fs).unwrap();
        assert_eq!(layout.uniforms.len(), 3);
        assert_eq!(layout.uniform_index("tint"), Some(1));
        assert_eq!(layout.attribute("vertex_color").map(|a| a.location), Some(1));
        assert!(layout.block_size >= 84);
    }

    #[test]
    fn link_rejects_unwritten_varying() {
        let vs = reflect_stage(ShaderStage::Vertex, VS).unwrap();
        let fs_src = FS.replace("@location(0) color", "@location(3) color");
        let fs = reflect_stage(ShaderStage::Fragment, &fs_src).unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.contains("location 3"));
    }

    #[test]
    fn uniform_kind_accepts_matching_values() {
        assert!(UniformKind::Vec2.accepts(&UniformValue::Vec2([0.0; 2])));
        assert!(!UniformKind::Vec2.accepts(&UniformValue::Vec4([0.0; 4])));
    }
}
