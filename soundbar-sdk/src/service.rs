//! Static table of the UPnP services a soundbar exposes

use std::fmt;

use serde::{Deserialize, Serialize};
use soundbar_parser::ChangeKind;

/// The UPnP services exposed by the device.
///
/// Each service carries its id, type URN and the action names its firmware
/// advertises. Only [`Service::SUBSCRIBABLE`] services are evented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Service {
    AvTransport,
    ConnectionManager,
    PlayQueue,
    QPlay,
    RenderingControl,
}

impl Service {
    /// Every known service
    pub const ALL: [Service; 5] = [
        Service::AvTransport,
        Service::ConnectionManager,
        Service::PlayQueue,
        Service::QPlay,
        Service::RenderingControl,
    ];

    /// Services the listener subscribes to
    pub const SUBSCRIBABLE: [Service; 2] = [Service::AvTransport, Service::RenderingControl];

    /// Short service name, as used in the description's control paths
    pub fn name(&self) -> &'static str {
        match self {
            Service::AvTransport => "AVTransport",
            Service::ConnectionManager => "ConnectionManager",
            Service::PlayQueue => "PlayQueue",
            Service::QPlay => "QPlay",
            Service::RenderingControl => "RenderingControl",
        }
    }

    pub fn service_id(&self) -> &'static str {
        match self {
            Service::AvTransport => "urn:upnp-org:serviceId:AVTransport",
            Service::ConnectionManager => "urn:upnp-org:serviceId:ConnectionManager",
            Service::PlayQueue => "urn:wiimu-com:serviceId:PlayQueue",
            Service::QPlay => "urn:tencent-com:serviceId:QPlay",
            Service::RenderingControl => "urn:upnp-org:serviceId:RenderingControl",
        }
    }

    pub fn service_type(&self) -> &'static str {
        match self {
            Service::AvTransport => "urn:schemas-upnp-org:service:AVTransport:1",
            Service::ConnectionManager => "urn:schemas-upnp-org:service:ConnectionManager:1",
            Service::PlayQueue => "urn:schemas-wiimu-com:service:PlayQueue:1",
            Service::QPlay => "urn:schemas-tencent-com:service:QPlay:1",
            Service::RenderingControl => "urn:schemas-upnp-org:service:RenderingControl:1",
        }
    }

    /// Action names the device firmware advertises for this service
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Service::AvTransport => &[
                "GetCurrentTransportActions",
                "GetDeviceCapabilities",
                "GetInfoEx",
                "GetMediaInfo",
                "GetPlayType",
                "GetPositionInfo",
                "GetTransportInfo",
                "GetTransportSettings",
                "Next",
                "Pause",
                "Play",
                "Previous",
                "Seek",
                "SeekBackward",
                "SeekForward",
                "SetAVTransportURI",
                "SetPlayMode",
                "Stop",
            ],
            Service::ConnectionManager => &[
                "GetCurrentConnectionIDs",
                "GetCurrentConnectionInfo",
                "GetProtocolInfo",
            ],
            Service::PlayQueue => &[
                "AppendQueue",
                "AppendTracksInQueue",
                "AppendTracksInQueueEx",
                "BackUpQueue",
                "BrowseQueue",
                "CreateQueue",
                "DeleteActionQueue",
                "DeleteQueue",
                "GetKeyMapping",
                "GetQueueIndex",
                "GetQueueLoopMode",
                "GetQueueOnline",
                "GetUserAccountHistory",
                "GetUserFavorites",
                "GetUserInfo",
                "PlayQueueWithIndex",
                "RemoveTracksInQueue",
                "ReplaceQueue",
                "SearchQueueOnline",
                "SetKeyMapping",
                "SetQueueLoopMode",
                "SetQueuePolicy",
                "SetQueueRecord",
                "SetSongsRecord",
                "SetSpotifyPreset",
                "SetUserFavorites",
                "UserLogin",
                "UserLogout",
                "UserRegister",
            ],
            Service::QPlay => &[
                "GetMaxTracks",
                "GetTracksCount",
                "GetTracksInfo",
                "InsertTracks",
                "QPlayAuth",
                "RemoveAllTracks",
                "RemoveTracks",
                "SetNetwork",
                "SetTracksInfo",
            ],
            Service::RenderingControl => &[
                "DeleteAlarmQueue",
                "GetAlarmQueue",
                "GetChannel",
                "GetControlDeviceInfo",
                "GetEqualizer",
                "GetMute",
                "GetSimpleDeviceInfo",
                "GetVolume",
                "ListPresets",
                "MultiPlaySlaveMask",
                "SelectPreset",
                "SetAlarmQueue",
                "SetChannel",
                "SetDeviceName",
                "SetEqualizer",
                "SetMute",
                "SetVolume",
                "StreamServicesCapability",
            ],
        }
    }

    pub fn supports(&self, action: &str) -> bool {
        self.actions().contains(&action)
    }

    pub fn is_subscribable(&self) -> bool {
        Self::SUBSCRIBABLE.contains(self)
    }

    /// Look up a service by its `serviceId`
    pub fn from_service_id(service_id: &str) -> Option<Service> {
        Self::ALL
            .into_iter()
            .find(|service| service.service_id() == service_id)
    }

    /// The change-set shape carried by this service's events
    pub fn change_kind(&self) -> Option<ChangeKind> {
        match self {
            Service::AvTransport => Some(ChangeKind::AvTransport),
            Service::RenderingControl => Some(ChangeKind::RenderingControl),
            _ => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
