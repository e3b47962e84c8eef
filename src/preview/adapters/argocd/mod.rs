//! Argo CD adapter for the deployment controller port.

mod client;
mod descriptor;

pub use client::ArgoCdClient;
pub use descriptor::{
    ApplicationDescriptor, AutomatedSync, DescriptorDestination, DescriptorMetadata,
    DescriptorSource, DescriptorSpec, DescriptorSyncPolicy, HelmOverrides, HelmParameter,
};
