// src/compute/kernel.rs

/// Entry point of [`COPY_KERNEL_SOURCE`].
pub const COPY_KERNEL_NAME: &str = "process_image";

/// Build options for [`COPY_KERNEL_SOURCE`]. OpenCL C 1.2 keeps work groups
/// uniform, so a global range the local size does not divide is refused.
pub const COPY_KERNEL_BUILD_OPTIONS: &str = "-cl-std=CL1.2";

/// Byte-for-byte RGBA copy. A correct launch returns its input unchanged.
pub const COPY_KERNEL_SOURCE: &str = r#"
__kernel void process_image(
    __global const uchar* input,
    __global uchar* output,
    uint width,
    uint height
) {
    size_t x = get_global_id(0);
    size_t y = get_global_id(1);
    if (x >= width || y >= height) return;
    size_t idx = (y * width + x) * 4;
    output[idx + 0] = input[idx + 0];
    output[idx + 1] = input[idx + 1];
    output[idx + 2] = input[idx + 2];
    output[idx + 3] = input[idx + 3];
}
"#;
