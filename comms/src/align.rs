// Primitive number types whose bytes can be reinterpreted freely.
pub trait Align1: bytemuck::Pod {}

impl Align1 for u8 {}
impl Align1 for u32 {}
impl Align1 for u64 {}
impl Align1 for f32 {}
impl Align1 for f64 {}

// Primitive number types that are at least 4 bytes aligned, so a receive buffer made
// of them can be reinterpreted as `f32` after the 4 byte message header.
pub trait Align4: Align1 {}

impl Align4 for u32 {}
impl Align4 for u64 {}
impl Align4 for f32 {}
impl Align4 for f64 {}
