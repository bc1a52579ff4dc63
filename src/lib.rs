// 模块划分：领域模型、测距、执行器、上传与控制循环；board 为 ESP-IDF 板级实现
pub mod api;
pub mod barrier;
pub mod clock;
pub mod controller;
pub mod events;
pub mod http;
pub mod indicator;
pub mod model;
pub mod sensor;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod upload;
pub mod verdict;

#[cfg(target_os = "espidf")]
pub mod board;
