/// Types that expose a raw Vulkan handle.
pub trait AsVkHandle {
    type Handle: ash::vk::Handle + Copy;
    fn vk_handle(&self) -> Self::Handle;
}
impl<T> AsVkHandle for &'_ T
where
    T: AsVkHandle,
{
    type Handle = T::Handle;

    fn vk_handle(&self) -> Self::Handle {
        T::vk_handle(self)
    }
}
