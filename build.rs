fn main() {
    // ESP-IDF environment (linker args, sdkconfig) is only needed for firmware builds.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
