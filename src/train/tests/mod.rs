//! Unit tests for phrase detection, the corpus file, vector parsing,
//! projection, the container backend and the train handler.
