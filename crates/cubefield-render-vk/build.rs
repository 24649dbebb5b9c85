use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Matches the pipeline's vertex input:
    //   - binding 0 (per vertex):   location 0 pos, 1 color, 2 uv
    //   - binding 1 (per instance): locations 3..6 are the columns of the model matrix
    let vs_src = r#"
#version 450
layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inUV;
layout(location = 3) in mat4 instModel;

layout(set = 0, binding = 0) uniform Frame {
    mat4 model;
    mat4 view;
    mat4 proj;
} u;

layout(location = 0) out vec3 vColor;
layout(location = 1) out vec2 vUV;

void main() {
    vColor = inColor;
    vUV = inUV;
    gl_Position = u.proj * u.view * instModel * u.model * vec4(inPos, 1.0);
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 1) in vec2 vUV;

layout(set = 0, binding = 1) uniform sampler2D tex;

layout(location = 0) out vec4 outColor;

void main() {
    outColor = texture(tex, vUV) * vec4(vColor, 1.0);
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "cube.vert",
            "main",
            Some(&opts),
        )
        .unwrap();

    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "cube.frag",
            "main",
            Some(&opts),
        )
        .unwrap();

    fs::write(out.join("cube.vert.spv"), vs_spv.as_binary_u8()).unwrap();
    fs::write(out.join("cube.frag.spv"), fs_spv.as_binary_u8()).unwrap();

    // Inline sources live here
    println!("cargo:rerun-if-changed=build.rs");
}
