// SPDX-License-Identifier: CEPL-1.0
//! Static inputs handed to the renderer at startup: one unit cube, its instances and a texture.
use bytemuck::{Pod, Zeroable};
use cubefield_math::glam::{Mat4, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

/// Per-instance record read at vertex binding 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
}

impl InstanceData {
    pub fn from_mat4(m: Mat4) -> Self {
        Self {
            model: m.to_cols_array_2d(),
        }
    }
}

/// Uniform block at set 0, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformBlock {
    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }
}

/// Tightly packed RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Two-tone checkerboard used when no texture file is configured.
    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let v = if light { 235 } else { 60 };
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }
}

pub struct SceneData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub instances: Vec<InstanceData>,
    pub texture: TextureData,
}

impl SceneData {
    pub fn cubes(texture: TextureData) -> Self {
        Self {
            vertices: cube_vertices(),
            indices: cube_indices(),
            instances: default_instances(),
            texture,
        }
    }
}

const FACE_COLORS: [[f32; 3]; 4] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
];
const FACE_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// 24 vertices: four per face so every face gets its own UVs.
pub fn cube_vertices() -> Vec<Vertex> {
    // corners per face, counter-clockwise seen from outside
    const FACES: [[[f32; 3]; 4]; 6] = [
        // +Z
        [[-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0]],
        // -Z
        [[-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0]],
        // -X
        [[-1.0, -1.0, -1.0], [-1.0, -1.0, 1.0], [-1.0, 1.0, 1.0], [-1.0, 1.0, -1.0]],
        // +X
        [[1.0, -1.0, -1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, -1.0]],
        // -Y
        [[-1.0, -1.0, -1.0], [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, -1.0, -1.0]],
        // +Y
        [[-1.0, 1.0, -1.0], [-1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, -1.0]],
    ];

    FACES
        .iter()
        .flat_map(|face| {
            face.iter().enumerate().map(|(i, &pos)| Vertex {
                pos,
                color: FACE_COLORS[i],
                uv: FACE_UVS[i],
            })
        })
        .collect()
}

/// Two triangles per face, 36 indices total.
pub fn cube_indices() -> Vec<u16> {
    (0..6u16)
        .flat_map(|face| {
            let b = face * 4;
            [b, b + 1, b + 2, b, b + 2, b + 3]
        })
        .collect()
}

pub fn default_instances() -> Vec<InstanceData> {
    [
        Mat4::from_scale(Vec3::splat(120.0)),
        Mat4::from_scale(Vec3::splat(60.0)),
        Mat4::from_scale(Vec3::splat(30.0)),
        Mat4::from_translation(Vec3::new(5.0, 3.0, 0.0)),
        Mat4::from_translation(Vec3::new(7.0, 6.0, 0.0)),
        Mat4::from_translation(Vec3::new(9.0, 9.0, 0.0)),
    ]
    .into_iter()
    .map(InstanceData::from_mat4)
    .collect()
}
